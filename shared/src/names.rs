use std::collections::BTreeMap;
use crate::protocol::TXT_DISPLAY_NAME_KEYS;

/// Labels keyed by the full raw service type.
fn label_for_full_type(service_type: &str) -> Option<&'static str> {
    let label = match service_type {
        "_googlecast._tcp.local." => "Google Cast (Chromecast/Google Home)",
        "_hue._tcp.local." => "Philips Hue Bridge",
        "_hap._tcp.local." => "Apple HomeKit Accessory (HAP)",
        "_airplay._tcp.local." => "Apple AirPlay / AppleTV",
        "_spotify-connect._tcp.local." => "Spotify Connect",
        "_http._tcp.local." => "HTTP Web Service",
        "_https._tcp.local." => "HTTPS Web Service",
        "_ssh._tcp.local." => "SSH Service",
        "_ipp._tcp.local." => "IPP Printer",
        "_printer._tcp.local." => "Network Printer",
        "_scanner._tcp.local." => "Network Scanner",
        "_amzn-wplay._tcp.local." => "Amazon Fire / Alexa",
        "_androidtvremote2._tcp.local." => "Android TV Remote",
        "_companion-link._tcp.local." => "Companion Link / Phone Link",
        "_carplay-ctrl._tcp.local." => "Apple CarPlay Control",
        "_spotify-social-listening._tcp.local." => "Spotify Social Listening",
        "_sonos._tcp.local." => "Sonos",
        "_matter._tcp.local." => "Matter Smart Home Device",
        _ => return None,
    };
    Some(label)
}

/// Labels keyed by the short service name (see [`short_service_name`]).
fn label_for_short_type(short: &str) -> Option<&'static str> {
    let label = match short {
        "googlecast" => "Google Cast (Chromecast/Google Home)",
        "googlecast-tls" => "Google Cast (secure)",
        "hue" | "philipshue" => "Philips Hue Bridge",
        "airplay" => "Apple AirPlay / AppleTV",
        "airplay2" => "Apple AirPlay 2",
        "raop" => "AirPlay (RAOP)",
        "raopv2" => "AirPlay (RAOP v2)",
        "homekit" => "Apple HomeKit Accessory",
        "hap" => "Apple HomeKit Accessory (HAP)",
        "amzn-alexa" => "Amazon Alexa / Echo",
        "amzn-wplay" => "Amazon Fire TV / Alexa Cast",
        "sonos" => "Sonos Speaker",
        "spotify-connect" => "Spotify Connect",
        "spotify" => "Spotify Service",
        "roku" => "Roku Device",
        "androidtv" => "Android TV",
        "androidtvremote2" => "Android TV Remote",
        "chromecast" => "Chromecast",
        "dlna" => "DLNA Media Server / Renderer",
        "ipp" => "IPP Printer",
        "printer" => "Network Printer",
        "pdl-datastream" => "Printer (PDL datastream)",
        "scanner" => "Network Scanner",
        "uscan" => "Scanner",
        "privet" => "Cloud Print / Privet Printer",
        "home-assistant" => "Home Assistant",
        "mqtt" => "MQTT Broker",
        "mqtt-tls" => "MQTT Broker (TLS)",
        "tplink" => "TP-Link Smart Device",
        "tplink-https" => "TP-Link (HTTPS)",
        "aqara-setup" => "Aqara Setup / Hub",
        "aqara" => "Aqara device",
        "matter" => "Matter Smart Home Device",
        "hap-ble" => "HAP over BLE (HomeKit)",
        "http" => "HTTP Web Service",
        "https" => "HTTPS Web Service",
        "ssh" => "SSH Service",
        "ftp" => "FTP Service",
        "smb" => "SMB / Windows Share",
        "afpovertcp" => "Apple Filing Protocol (AFP)",
        "smbd" => "SMB",
        "googlezone" => "Google Zone / Cast",
        "apple-mobdev2" => "Apple Mobile Device",
        "companion-link" => "Companion Link / Phone Link",
        "carplay-ctrl" => "Apple CarPlay Control",
        "http-alt" => "Alternate HTTP",
        "cros-p2p" => "ChromeOS P2P service (Chromebook)",
        _ => return None,
    };
    Some(label)
}

/// Short, lower-case service name: `"_hue._tcp.local."` becomes `"hue"`.
pub fn short_service_name(service_type: &str) -> String {
    let trimmed = service_type.strip_prefix('_').unwrap_or(service_type);
    let first = trimmed.split("._").next().unwrap_or(trimmed);
    first
        .replace(".local.", "")
        .replace(".local", "")
        .to_lowercase()
}

/// Derive a display label for a service. Never empty.
///
/// Precedence: full-type table, short-name table, a display name advertised in the
/// TXT metadata, then `"<short> (service)"`.
pub fn friendly_name(service_type: &str, metadata: &BTreeMap<String, String>) -> String {
    if let Some(label) = label_for_full_type(service_type) {
        return label.to_string();
    }

    let short = short_service_name(service_type);
    if let Some(label) = label_for_short_type(&short) {
        return label.to_string();
    }

    let advertised = TXT_DISPLAY_NAME_KEYS
        .iter()
        .filter_map(|key| metadata.get(*key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty());
    if let Some(name) = advertised {
        return name.to_string();
    }

    if short.is_empty() {
        "unknown (service)".to_string()
    } else {
        format!("{} (service)", short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_short_service_name() {
        assert_eq!(short_service_name("_hue._tcp.local."), "hue");
        assert_eq!(short_service_name("_GoogleCast._tcp.local."), "googlecast");
        assert_eq!(short_service_name("_mqtt._udp.local"), "mqtt");
        assert_eq!(short_service_name("printer.local."), "printer");
        assert_eq!(short_service_name(""), "");
    }

    #[test]
    fn test_full_type_table_wins() {
        let label = friendly_name("_hue._tcp.local.", &BTreeMap::new());
        assert_eq!(label, "Philips Hue Bridge");
        assert_eq!(friendly_name("_hue._tcp.local.", &BTreeMap::new()), label);
    }

    #[test]
    fn test_short_table_ignores_metadata() {
        let label = friendly_name("_roku._tcp.local.", &meta(&[("fn", "Living Room")]));
        assert_eq!(label, "Roku Device");
    }

    #[test]
    fn test_metadata_display_name() {
        let label = friendly_name("_acme-lamp._tcp.local.", &meta(&[("name", "Desk Lamp")]));
        assert_eq!(label, "Desk Lamp");

        let label = friendly_name(
            "_acme-lamp._tcp.local.",
            &meta(&[("fn", "Kitchen Lamp"), ("name", "lamp-01")]),
        );
        assert_eq!(label, "Kitchen Lamp");
    }

    #[test]
    fn test_blank_metadata_falls_through() {
        let label = friendly_name("_acme-lamp._tcp.local.", &meta(&[("fn", "  ")]));
        assert_eq!(label, "acme-lamp (service)");
    }

    #[test]
    fn test_unknown_type_fallback() {
        let label = friendly_name("_unknown123._tcp.local.", &BTreeMap::new());
        assert!(label.contains("unknown123"));
        assert!(!friendly_name("", &BTreeMap::new()).is_empty());
    }
}
