/*!
 * Capability Token Integration Tests
 * Tamper-evidence, expiry, quota, and serialization round-trips
 */

use pretty_assertions::assert_eq;
use sandbox_core::{CapabilityConstraint, CapabilityError, CapabilityToken, ResourcePatterns};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[test]
fn test_integrity_tamper_evidence() {
    let mut token = CapabilityToken::file(["*.txt"], ["read"]).unwrap();
    assert!(token.validate_integrity());
    assert!(token.is_valid());

    token.capability_type = "network".to_string();

    assert!(!token.validate_integrity(), "tampered type must fail integrity");
    assert!(!token.is_valid(), "tampered token must be invalid");
    assert!(
        !token.can_access_resource("a.txt", "read"),
        "tampered token must deny everything"
    );

    // Tampering is permanent: no constraint change can restore validity
    token.constraints = CapabilityConstraint::new();
    assert!(!token.is_valid());
}

#[test]
fn test_expiry_monotonicity() {
    let expired = CapabilityToken::new(
        "file",
        CapabilityConstraint::new().with_expiry(UNIX_EPOCH),
    );
    assert!(!expired.is_valid());
    assert!(!expired.can_access_resource("a.txt", "read"));

    let mut expired = expired;
    let err = expired.use_token("a.txt", "read").unwrap_err();
    assert!(matches!(err, CapabilityError::Expired { .. }));

    let fresh = CapabilityToken::new(
        "file",
        CapabilityConstraint::new().with_expiry(SystemTime::now() + Duration::from_secs(3600)),
    );
    assert!(fresh.is_valid());
    assert!(fresh.can_access_resource("a.txt", "read"));
}

#[test]
fn test_revocation_via_constraint_tightening() {
    let mut token = CapabilityToken::file(["*.txt"], ["read"]).unwrap();
    assert!(token.can_access_resource("a.txt", "read"));

    token.constraints.revoke_now();

    assert!(!token.is_valid());
    // The checksum deliberately excludes constraints, so revocation
    // does not look like tampering
    assert!(token.validate_integrity());
}

#[test]
fn test_quota_exhaustion() {
    let mut token = CapabilityToken::new(
        "file",
        CapabilityConstraint::new().with_max_usage_count(3),
    );

    for _ in 0..3 {
        token.use_token("a.txt", "read").unwrap();
    }
    assert_eq!(token.usage_count(), 3);
    assert_eq!(token.remaining_uses(), Some(0));
    assert!(!token.is_valid());

    let err = token.use_token("a.txt", "read").unwrap_err();
    assert!(matches!(err, CapabilityError::QuotaExceeded { limit: 3, .. }));
    assert_eq!(token.usage_count(), 3, "usage never exceeds the quota");
}

#[test]
fn test_pattern_and_operation_mismatch_errors() {
    let mut token = CapabilityToken::file(["data/**", "*.txt"], ["read", "stat"]).unwrap();

    assert!(matches!(
        token.use_token("/etc/passwd", "read").unwrap_err(),
        CapabilityError::ResourceMismatch { .. }
    ));
    assert!(matches!(
        token.use_token("a.txt", "write").unwrap_err(),
        CapabilityError::OperationNotAllowed { .. }
    ));
    assert_eq!(token.usage_count(), 0, "failed uses are not counted");

    token.use_token("data/nested/blob.bin", "read").unwrap();
    assert_eq!(token.usage_count(), 1);
}

#[test]
fn test_round_trip_serialization() {
    let mut token = CapabilityToken::new(
        "file",
        CapabilityConstraint::new()
            .with_resource_patterns(ResourcePatterns::new(["*.txt", "logs/**"]).unwrap())
            .with_operations(["read", "write"])
            .with_max_usage_count(10)
            .with_expiry(SystemTime::now() + Duration::from_secs(600))
            .with_allowed_hosts(["example.com"])
            .with_allowed_ports([443]),
    )
    .with_provenance("launcher", "scoped file grant");
    token.use_token("a.txt", "read").unwrap();
    token.use_token("logs/app.log", "write").unwrap();

    let json = serde_json::to_string_pretty(&token).unwrap();
    let restored: CapabilityToken = serde_json::from_str(&json).unwrap();

    assert_eq!(restored.token_id(), token.token_id());
    assert_eq!(restored.capability_type, token.capability_type);
    assert_eq!(restored.usage_count(), 2);
    assert_eq!(restored.last_used_at().is_some(), token.last_used_at().is_some());
    assert_eq!(
        restored.constraints.resource_patterns(),
        token.constraints.resource_patterns()
    );
    assert_eq!(
        restored.constraints.allowed_operations(),
        token.constraints.allowed_operations()
    );
    assert_eq!(restored.constraints.max_usage_count(), Some(10));
    assert_eq!(restored.constraints.allowed_hosts(), ["example.com"]);
    assert_eq!(restored.constraints.allowed_ports(), [443]);

    assert!(restored.validate_integrity());
    assert!(restored.can_access_resource("b.txt", "read"));
    assert!(!restored.can_access_resource("b.md", "read"));
}

#[test]
fn test_network_token_constraints() {
    let token = CapabilityToken::network(["*.internal.net", "localhost"], [80, 443]);
    assert!(token.is_valid());
    assert!(token.constraints.allows_host("db.internal.net"));
    assert!(token.constraints.allows_host("localhost"));
    assert!(!token.constraints.allows_host("internal.net"));
    assert!(token.constraints.allows_port(443));
    assert!(!token.constraints.allows_port(22));
}
