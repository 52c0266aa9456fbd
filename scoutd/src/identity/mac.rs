/// Normalize a hardware address to `AA:BB:CC:DD:EE:FF`.
///
/// Accepts colon, dash or dot separators, bare 12-digit hex, and single-digit octets
/// as printed by BSD `arp` (`0:1b:2:..`). Returns `None` for anything else and for the
/// all-zero address the kernel reports for incomplete neighbor entries.
pub fn format_mac(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let octets: Vec<String> = if raw.len() == 12 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
        (0..12).step_by(2).map(|i| raw[i..i + 2].to_string()).collect()
    } else if raw.contains('.') {
        // Cisco style aabb.ccdd.eeff
        let digits: String = raw.chars().filter(|c| *c != '.').collect();
        if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        (0..12).step_by(2).map(|i| digits[i..i + 2].to_string()).collect()
    } else {
        raw.split([':', '-'])
            .map(|octet| format!("{:0>2}", octet))
            .collect()
    };

    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return None;
    }

    let mac = octets.join(":").to_uppercase();
    if mac == "00:00:00:00:00:00" {
        return None;
    }
    Some(mac)
}

/// First three octets as bare upper-case hex, e.g. `"00178B"`.
pub fn oui_prefix(mac: &str) -> Option<String> {
    let mac = format_mac(mac)?;
    Some(mac.split(':').take(3).collect::<String>())
}
