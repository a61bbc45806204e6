//! Entity identifier normalization.

/// Prefix shared by every NGSI-LD entity URN.
pub const NGSI_LD_PREFIX: &str = "urn:ngsi-ld:";

/// Normalize a raw entity id into `urn:ngsi-ld:{entity_type}:{raw_id}`.
///
/// Empty ids and ids that already carry the prefix come back unchanged, which
/// makes the function idempotent. `None` stays `None`. Characters are not
/// validated.
///
/// ```
/// use ngsi_client::format_entity_id;
///
/// assert_eq!(
///     format_entity_id("Room", Some("001")).as_deref(),
///     Some("urn:ngsi-ld:Room:001")
/// );
/// assert_eq!(
///     format_entity_id("Room", Some("urn:ngsi-ld:Room:001")).as_deref(),
///     Some("urn:ngsi-ld:Room:001")
/// );
/// assert_eq!(format_entity_id("Room", None), None);
/// ```
pub fn format_entity_id(entity_type: &str, raw_id: Option<&str>) -> Option<String> {
    let raw_id = raw_id?;
    if raw_id.is_empty() || raw_id.starts_with(NGSI_LD_PREFIX) {
        return Some(raw_id.to_string());
    }
    Some(format!("{NGSI_LD_PREFIX}{entity_type}:{raw_id}"))
}
