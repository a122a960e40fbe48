//! Key layout helpers
//!
//! Every store key the crate reads or writes is built here.

/// Entity row hash
pub fn row_key(namespace: &str, id: &str) -> String {
    format!("{}:{}", namespace, id)
}

/// Unique index hash for a column or composite group name
pub fn unique_key(namespace: &str, column: &str) -> String {
    format!("{}:{}:uidx", namespace, column)
}

/// Set or sorted-set index key; `key` is `column` or `column:token`
pub fn index_key(namespace: &str, key: &str) -> String {
    format!("{}:{}:idx", namespace, key)
}

/// Prefix index sorted set
pub fn prefix_key(namespace: &str, column: &str) -> String {
    format!("{}:{}:pre", namespace, column)
}

/// Suffix index sorted set
pub fn suffix_key(namespace: &str, column: &str) -> String {
    format!("{}:{}:suf", namespace, column)
}

/// Per-namespace manifest hash (id -> index entries of the last save)
pub fn manifest_key(namespace: &str) -> String {
    format!("{}::", namespace)
}

/// Id counter for the primary key column
pub fn counter_key(namespace: &str, pkey: &str) -> String {
    format!("{}:{}:", namespace, pkey)
}

/// Prefix/suffix sorted-set member
pub fn affix_member(token: &str, id: &str) -> String {
    format!("{}\0{}", token, id)
}

/// Split a prefix/suffix member back into `(token, id)`
pub fn split_affix_member(member: &str) -> Option<(&str, &str)> {
    member.rsplit_once('\0')
}

/// Name of the unique hash for a composite group
pub fn composite_name(columns: &[String]) -> String {
    columns.join(":")
}
