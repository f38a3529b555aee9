//! Best-effort service identification from a banner or a well-known port number.
//!
//! The label is a hint, never authoritative.

/// Banner substrings checked in order; the first match wins.
const BANNER_SIGNATURES: &[(&str, &str)] = &[
    ("SSH", "SSH"),
    ("HTTP", "HTTP"),
    ("FTP", "FTP"),
    ("SMTP", "SMTP"),
    ("MySQL", "MySQL"),
    ("PostgreSQL", "PostgreSQL"),
];

const WELL_KNOWN_PORTS: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1433, "MSSQL"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (6379, "Redis"),
    (8080, "HTTP-Alt"),
];

/// Guess the service behind `port`, preferring banner signatures over the port table.
pub fn classify(port: u16, banner: Option<&str>) -> Option<&'static str> {
    banner
        .and_then(match_banner)
        .or_else(|| lookup_port(port))
}

/// Case-sensitive substring match against the signature list.
pub fn match_banner(banner: &str) -> Option<&'static str> {
    BANNER_SIGNATURES
        .iter()
        .find(|(needle, _)| banner.contains(needle))
        .map(|&(_, label)| label)
}

pub fn lookup_port(port: u16) -> Option<&'static str> {
    WELL_KNOWN_PORTS
        .iter()
        .find(|&&(p, _)| p == port)
        .map(|&(_, label)| label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_beats_port_table() {
        let banner = "Apache/2.4.41 HTTP/1.1 200 OK";
        let first = classify(80, Some(banner));
        assert_eq!(first, Some("HTTP"));
        for _ in 0..10 {
            assert_eq!(classify(80, Some(banner)), first);
        }
        // Same banner on a port whose table entry differs.
        assert_eq!(classify(8080, Some(banner)), Some("HTTP"));
    }

    #[test]
    fn signature_order_breaks_ties() {
        // Contains both "SSH" and "HTTP"; SSH is listed first.
        assert_eq!(match_banner("HTTP proxy in front of SSH"), Some("SSH"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(match_banner("openssh"), None);
        assert_eq!(classify(9999, Some("mysql")), None);
    }

    #[test]
    fn falls_back_to_port_table() {
        assert_eq!(classify(22, None), Some("SSH"));
        assert_eq!(classify(6379, Some("+PONG")), Some("Redis"));
        assert_eq!(classify(8080, None), Some("HTTP-Alt"));
    }

    #[test]
    fn unknown_port_without_banner_is_unlabelled() {
        assert_eq!(classify(31337, None), None);
    }
}
