use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use super::*;
use crate::domain::error::ErrorCode;
use crate::domain::ports::{
    AnalyticsRepositoryError, MockTokenAnalyticsRepository, MockTokenRepository,
};
use crate::domain::token_codec::SigningContext;
use crate::test_support::{InMemoryAnalyticsRepository, InMemoryTokenRepository, TestClock};

struct Harness {
    service: TokenService<InMemoryTokenRepository, InMemoryAnalyticsRepository>,
    tokens: Arc<InMemoryTokenRepository>,
    analytics: Arc<InMemoryAnalyticsRepository>,
    clock: Arc<TestClock>,
}

fn harness() -> Harness {
    let start = Utc
        .with_ymd_and_hms(2026, 8, 24, 12, 0, 0)
        .single()
        .expect("valid timestamp");
    let tokens = Arc::new(InMemoryTokenRepository::default());
    let analytics = Arc::new(InMemoryAnalyticsRepository::default());
    let clock = Arc::new(TestClock::at(start));
    let codec = TokenCodec::new(SigningContext::from_secret(b"unit-test-secret"));
    let service = TokenService::new(
        codec,
        Arc::clone(&tokens),
        Arc::clone(&analytics),
        clock.clone() as Arc<dyn Clock>,
    );
    Harness {
        service,
        tokens,
        analytics,
        clock,
    }
}

async fn issue(h: &Harness) -> IssuedToken {
    h.service
        .issue(UserId::random(), "Ada", PromptId::random(), 96)
        .await
        .expect("issuance succeeds")
}

#[tokio::test]
async fn valid_token_before_expiry_needs_no_grace() {
    let h = harness();
    let issued = issue(&h).await;

    let outcome = h
        .service
        .validate(&issued.encoded, None, RequestMetadata::default())
        .await
        .expect("validation runs");

    assert!(outcome.is_valid());
    assert!(!outcome.grace_used());
    let ValidationOutcome::Valid { token, claims, .. } = outcome else {
        panic!("expected valid outcome");
    };
    assert_eq!(token.id, issued.record.id);
    assert_eq!(claims.user_id().expect("sub parses"), issued.record.user_id);
}

#[tokio::test]
async fn usage_tracking_accumulates_across_validations() {
    let h = harness();
    let issued = issue(&h).await;

    for _ in 0..3 {
        let outcome = h
            .service
            .validate(&issued.encoded, None, RequestMetadata::default())
            .await
            .expect("validation runs");
        assert!(outcome.is_valid());
    }

    let row = h.tokens.get(&issued.record.id).expect("row exists");
    assert_eq!(row.usage_count, 3);
    assert_eq!(row.last_used_at, Some(h.clock.utc()));
}

#[tokio::test]
async fn expired_token_with_fresh_form_session_is_granted_grace() {
    let h = harness();
    let issued = issue(&h).await;

    // Form loaded ten minutes before expiry; submission lands two minutes after.
    let form_loaded_at = issued.record.expires_at - Duration::minutes(10);
    h.clock.set(issued.record.expires_at + Duration::minutes(2));

    let outcome = h
        .service
        .validate(&issued.encoded, Some(form_loaded_at), RequestMetadata::default())
        .await
        .expect("validation runs");

    assert!(outcome.is_valid());
    assert!(outcome.grace_used());
}

#[tokio::test]
async fn grace_window_boundary_is_inclusive() {
    let h = harness();
    let issued = issue(&h).await;
    let form_loaded_at = issued.record.expires_at - Duration::minutes(1);
    h.clock.set(issued.record.expires_at + GRACE_WINDOW);

    let outcome = h
        .service
        .validate(&issued.encoded, Some(form_loaded_at), RequestMetadata::default())
        .await
        .expect("validation runs");

    assert!(outcome.is_valid());
    assert!(outcome.grace_used());
}

#[tokio::test]
async fn submission_past_grace_window_is_expired() {
    let h = harness();
    let issued = issue(&h).await;
    let form_loaded_at = issued.record.expires_at - Duration::minutes(1);
    h.clock
        .set(issued.record.expires_at + GRACE_WINDOW + Duration::seconds(1));

    let outcome = h
        .service
        .validate(&issued.encoded, Some(form_loaded_at), RequestMetadata::default())
        .await
        .expect("validation runs");

    assert_eq!(outcome.failure(), Some(ValidationFailure::TokenExpired));
}

#[tokio::test]
async fn form_loaded_after_expiry_gets_no_grace() {
    let h = harness();
    let issued = issue(&h).await;
    let form_loaded_at = issued.record.expires_at + Duration::minutes(1);
    h.clock.set(issued.record.expires_at + Duration::minutes(2));

    let outcome = h
        .service
        .validate(&issued.encoded, Some(form_loaded_at), RequestMetadata::default())
        .await
        .expect("validation runs");

    assert_eq!(outcome.failure(), Some(ValidationFailure::TokenExpired));
}

#[tokio::test]
async fn expired_without_form_load_time_is_rejected() {
    let h = harness();
    let issued = issue(&h).await;
    h.clock.set(issued.record.expires_at + Duration::seconds(30));

    let outcome = h
        .service
        .validate(&issued.encoded, None, RequestMetadata::default())
        .await
        .expect("validation runs");

    assert_eq!(outcome.failure(), Some(ValidationFailure::TokenExpired));
}

#[tokio::test]
async fn revoked_token_is_rejected_even_before_expiry() {
    let h = harness();
    let issued = issue(&h).await;
    assert!(h.service.revoke(&issued.record.id).await.expect("revokes"));

    let outcome = h
        .service
        .validate(&issued.encoded, None, RequestMetadata::default())
        .await
        .expect("validation runs");

    assert_eq!(outcome.failure(), Some(ValidationFailure::TokenRevoked));
    let row = h.tokens.get(&issued.record.id).expect("row exists");
    assert_eq!(row.usage_count, 0);
}

#[tokio::test]
async fn revoking_unknown_token_reports_false() {
    let h = harness();
    assert!(!h.service.revoke(&TokenId::random()).await.expect("runs"));
}

#[tokio::test]
async fn signed_token_without_stored_row_is_not_found() {
    let h = harness();
    let codec = TokenCodec::new(SigningContext::from_secret(b"unit-test-secret"));
    let claims = AvailabilityClaims {
        sub: UserId::random().to_string(),
        name: "Ada".to_owned(),
        prompt_id: PromptId::random().to_string(),
        aud: TOKEN_AUDIENCE.to_owned(),
        iss: TOKEN_ISSUER.to_owned(),
        jti: TokenId::random().to_string(),
        exp: (h.clock.utc() + Duration::hours(1)).timestamp(),
    };
    let orphan = codec.encode(&claims).expect("encodes");

    let outcome = h
        .service
        .validate(&orphan, None, RequestMetadata::default())
        .await
        .expect("validation runs");

    assert_eq!(outcome.failure(), Some(ValidationFailure::TokenNotFound));
}

#[tokio::test]
async fn malformed_input_never_panics_and_records_no_token_id() {
    let h = harness();
    for garbage in ["", "not-a-token", "a.b.c", "ey.ey.ey"] {
        let outcome = h
            .service
            .validate(garbage, None, RequestMetadata::default())
            .await
            .expect("validation runs");
        assert_eq!(outcome.failure(), Some(ValidationFailure::InvalidToken));
    }

    let records = h.analytics.records();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.token_id.is_none() && !r.success));
}

#[tokio::test]
async fn every_attempt_lands_in_the_analytics_log() {
    let h = harness();
    let issued = issue(&h).await;
    let requester = RequestMetadata {
        ip: Some("203.0.113.7".to_owned()),
        user_agent: Some("unit-test".to_owned()),
    };

    h.service
        .validate(&issued.encoded, None, requester.clone())
        .await
        .expect("validation runs");
    h.clock.set(issued.record.expires_at + Duration::minutes(2));
    h.service
        .validate(
            &issued.encoded,
            Some(issued.record.expires_at - Duration::minutes(3)),
            requester.clone(),
        )
        .await
        .expect("validation runs");
    h.clock.set(issued.record.expires_at + Duration::hours(1));
    h.service
        .validate(&issued.encoded, None, requester.clone())
        .await
        .expect("validation runs");

    let records = h.analytics.records();
    assert_eq!(records.len(), 3);
    assert!(records[0].success && !records[0].grace_used);
    assert!(records[1].success && records[1].grace_used);
    assert_eq!(
        records[2].failure_reason,
        Some(ValidationFailure::TokenExpired)
    );
    assert!(records.iter().all(|r| r.requester == requester));

    let summary = h.analytics.summary().await.expect("summarises");
    assert_eq!(summary.attempts, 3);
    assert_eq!(summary.successes, 2);
    assert_eq!(summary.grace_uses, 1);
    assert_eq!(summary.token_expired, 1);
}

#[tokio::test]
async fn token_store_outage_surfaces_as_service_unavailable() {
    let h = harness();
    let issued = issue(&h).await;

    let mut tokens = MockTokenRepository::new();
    tokens.expect_find_by_id().times(1).return_once(|_| {
        Err(TokenRepositoryError::Connection {
            message: "pool exhausted".to_owned(),
        })
    });
    let service = TokenService::new(
        TokenCodec::new(SigningContext::from_secret(b"unit-test-secret")),
        Arc::new(tokens),
        Arc::new(InMemoryAnalyticsRepository::default()),
        h.clock.clone() as Arc<dyn Clock>,
    );

    let err = service
        .validate(&issued.encoded, None, RequestMetadata::default())
        .await
        .expect_err("store outage propagates");
    assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
}

#[tokio::test]
async fn analytics_outage_does_not_fail_a_valid_submission() {
    let h = harness();
    let issued = issue(&h).await;

    let mut analytics = MockTokenAnalyticsRepository::new();
    analytics.expect_append().times(1).return_once(|_| {
        Err(AnalyticsRepositoryError::Connection {
            message: "log store down".to_owned(),
        })
    });
    let service = TokenService::new(
        TokenCodec::new(SigningContext::from_secret(b"unit-test-secret")),
        Arc::clone(&h.tokens),
        Arc::new(analytics),
        h.clock.clone() as Arc<dyn Clock>,
    );

    let outcome = service
        .validate(&issued.encoded, None, RequestMetadata::default())
        .await
        .expect("validation still runs");
    assert!(outcome.is_valid());
}
