/// DNS-SD meta query enumerating every advertised service type
pub const META_QUERY_TYPE: &str = "_services._dns-sd._udp.local.";

/// Domain suffix every browsed type is normalized to
pub const LOCAL_DOMAIN: &str = ".local.";

/// TXT record keys that may carry a display name, in precedence order
pub const TXT_DISPLAY_NAME_KEYS: &[&str] = &["fn", "friendly_name", "name"];

/// Normalize a service type announced by the meta query so it ends in ".local."
pub fn normalize_service_type(service_type: &str) -> String {
    if service_type.ends_with(LOCAL_DOMAIN) {
        service_type.to_string()
    } else if service_type.ends_with(".local") {
        format!("{}.", service_type)
    } else {
        format!("{}{}", service_type.trim_end_matches('.'), LOCAL_DOMAIN)
    }
}
