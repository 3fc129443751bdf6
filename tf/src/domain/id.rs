//! Domain ID generation
//!
//! IDs use the format `{type}-{12-char-hex}`, e.g. `trip-019430a1b2c3`.
//! The hex prefix comes from a UUIDv7, so IDs sort roughly by creation time.

/// Generate a domain ID for the given record type
pub fn generate_id(domain_type: &str) -> String {
    let uuid = uuid::Uuid::now_v7().simple().to_string();
    format!("{}-{}", domain_type, &uuid[..12])
}
