//! Route registration.

use actix_web::web;

use crate::inbound::http::{admin, availability, health};

/// Register every HTTP endpoint on the application. The caller supplies
/// `web::Data<HealthState>` and `web::Data<HttpState>`.
pub fn configure(config: &mut web::ServiceConfig) {
    config
        .service(health::live)
        .service(health::ready)
        .service(
            web::scope("/api/v1")
                .service(availability::form_context)
                .service(availability::submit_response)
                .service(availability::list_suggestions)
                .service(availability::list_respondents)
                .service(admin::trigger_prompt)
                .service(admin::send_reminders)
                .service(admin::recompute_suggestions)
                .service(admin::revoke_token)
                .service(admin::analytics_summary),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, test as actix_test};

    use crate::inbound::http::health::HealthState;
    use crate::inbound::http::test_utils::test_state;

    #[actix_web::test]
    async fn configure_registers_probes_and_the_api_scope() {
        let harness = test_state().await;
        let health = web::Data::new(HealthState::new());
        health.mark_ready();
        let app = actix_test::init_service(
            App::new()
                .app_data(health)
                .app_data(web::Data::new(harness.state.clone()))
                .configure(configure),
        )
        .await;

        let response = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri("/health/ready")
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri(&format!("/api/v1/prompts/{}/suggestions", harness.prompt_id))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
