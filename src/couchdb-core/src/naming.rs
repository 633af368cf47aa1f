const SYSTEM_DBS: &[&str] = &["_users", "_replicator", "_global_changes"];

/// CouchDB database name rule: `^[a-z][a-z0-9_$()+/-]*$`, plus the system databases.
pub fn is_valid_db_name(name: &str) -> bool {
    if SYSTEM_DBS.contains(&name) {
        return true;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| {
        c.is_ascii_lowercase()
            || c.is_ascii_digit()
            || matches!(c, '_' | '$' | '(' | ')' | '+' | '/' | '-')
    })
}

/// Path segments for a document id.
///
/// Design and local documents keep their prefix as a separate segment so the
/// slash is not escaped; any other id is a single (escaped) segment.
pub fn doc_path(id: &str) -> Vec<&str> {
    for prefix in ["_design/", "_local/"] {
        if let Some(rest) = id.strip_prefix(prefix) {
            return vec![&prefix[..prefix.len() - 1], rest];
        }
    }
    vec![id]
}

/// Random id for documents saved without `_id`
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
