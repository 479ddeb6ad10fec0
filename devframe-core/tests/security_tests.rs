// Tests for target URL validation

use devframe_core::error::ProxyError;
use devframe_core::security::validate_target_url;

#[test]
fn test_accepts_http_and_https() {
    assert!(validate_target_url("http://localhost:3000").is_ok());
    assert!(validate_target_url("https://example.com/app").is_ok());
}

#[test]
fn test_trims_whitespace() {
    let url = validate_target_url("  https://example.com  ").unwrap();
    assert_eq!(url.host_str(), Some("example.com"));
}

#[test]
fn test_rejects_other_schemes() {
    for raw in ["ftp://example.com", "file:///etc/passwd", "javascript:alert(1)"] {
        assert!(
            matches!(validate_target_url(raw), Err(ProxyError::InvalidTarget(_))),
            "{} should be rejected",
            raw
        );
    }
}

#[test]
fn test_rejects_garbage_and_empty() {
    assert!(matches!(
        validate_target_url("not a url"),
        Err(ProxyError::InvalidTarget(_))
    ));
    assert!(matches!(
        validate_target_url(""),
        Err(ProxyError::InvalidTarget(_))
    ));
    assert!(matches!(
        validate_target_url("/relative/path"),
        Err(ProxyError::InvalidTarget(_))
    ));
}

#[test]
fn test_rejects_metadata_ipv4() {
    assert!(validate_target_url("http://169.254.169.254/latest/meta-data/").is_err());
    assert!(validate_target_url("http://100.100.100.200/").is_err());
}

#[test]
fn test_rejects_metadata_hostnames() {
    assert!(validate_target_url("http://metadata.google.internal/computeMetadata/v1/").is_err());
    assert!(validate_target_url("http://METADATA.GOOGLE.INTERNAL./").is_err());
}

#[test]
fn test_rejects_metadata_ipv6() {
    assert!(validate_target_url("http://[fd00:ec2::254]/").is_err());
    assert!(validate_target_url("http://[::ffff:169.254.169.254]/").is_err());
}

#[test]
fn test_allows_other_link_local_names() {
    // Only metadata endpoints are blocked; local dev servers stay reachable.
    assert!(validate_target_url("http://127.0.0.1:8080").is_ok());
    assert!(validate_target_url("http://192.168.1.20").is_ok());
}
