use redb::TableDefinition;

/// Subjects: subject_id -> UserRecord (msgpack)
pub const USERS: TableDefinition<i64, &[u8]> = TableDefinition::new("users");

/// Secondary index: "<provider>:<external id>" -> subject_id
pub const PROVIDER_INDEX: TableDefinition<&str, i64> = TableDefinition::new("provider_index");

/// Short-lived entries (SMS codes, binding tokens, session cache): key -> KvEntry (msgpack)
pub const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// Expiration index: "<zero-padded expiry ms>:<key>" -> key
pub const KV_EXPIRY: TableDefinition<&str, &str> = TableDefinition::new("kv_expiry");

/// Counters and other singletons: name -> value
pub const META: TableDefinition<&str, i64> = TableDefinition::new("meta");
