// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Login state machine tests against canned portal pages.

use std::sync::Mutex;

use async_trait::async_trait;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sigaa_session::login::{
    CHALLENGE_FAILED_MARKER, INVALID_CREDENTIALS_MARKER, SUSPICIOUS_BEHAVIOR_MARKER,
};
use sigaa_session::{
    ChallengeSolver, Institution, LoginState, LoginStatus, SessionConfig, Sigaa, SigaaError,
};

// ─────────────────────── helpers ───────────────────────

const HTML: &str = "text/html; charset=UTF-8";
const MOBILE_FORM_PATH: &str = "/sigaa/mobile/touch/login.jsf";
const DESKTOP_FORM_PATH: &str = "/sigaa/logon.jsf";

const MOBILE_FORM: &str = r#"<html><body>
    <form id="form-login" action="/sigaa/mobile/touch/login.jsf" method="post">
      <input type="hidden" name="form-login" value="form-login">
      <input type="text" name="form-login:login">
      <input type="password" name="form-login:senha">
      <input type="submit" name="form-login:entrar" value="Entrar">
      <input type="hidden" name="javax.faces.ViewState" value="j_id1">
    </form></body></html>"#;

const DESKTOP_FORM: &str = r#"<html><body>
    <form name="form" action="/sigaa/logon.jsf" method="post">
      <input type="hidden" name="width" value="0">
      <input type="text" name="form:login">
      <input type="password" name="form:senha">
      <input type="submit" name="form:entrar" value="Entrar">
    </form></body></html>"#;

fn client(server: &MockServer, institution: Institution) -> Sigaa {
    Sigaa::new(SessionConfig::with_url(server.uri()).institution(institution)).unwrap()
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), HTML)
}

fn redirect(to: &str) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("location", to)
}

async fn count(server: &MockServer, verb: &str, wanted: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == wanted)
        .count()
}

async fn mount_form(server: &MockServer, form_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(form_path))
        .respond_with(html(body))
        .mount(server)
        .await;
}

async fn mount_submit(server: &MockServer, form_path: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(form_path))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mount the IFSC landing chain ending on the student portal.
async fn mount_ifsc_landing(server: &MockServer) {
    Mock::given(path("/sigaa/mobile/touch/menu.jsf"))
        .respond_with(html("<h1>Menu</h1>"))
        .mount(server)
        .await;
    Mock::given(path("/sigaa/paginaInicial.do"))
        .respond_with(redirect("/sigaa/portais/discente/discente.jsf"))
        .mount(server)
        .await;
    Mock::given(path("/sigaa/portais/discente/discente.jsf"))
        .respond_with(html("<h1>Portal do Discente</h1>"))
        .mount(server)
        .await;
}

struct RecordingSolver {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingSolver {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChallengeSolver for RecordingSolver {
    async fn solve(&self, site_key: &str, action: &str) -> sigaa_session::Result<String> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((site_key.to_string(), action.to_string()));
        Ok(format!("tok-{}", calls.len()))
    }
}

// ─────────────────────── failures ───────────────────────

#[tokio::test]
async fn test_invalid_credentials_single_submission() {
    let server = MockServer::start().await;
    mount_form(&server, MOBILE_FORM_PATH, MOBILE_FORM).await;
    let rejected = MOBILE_FORM.replace("</form>", &format!("</form><p>{INVALID_CREDENTIALS_MARKER}</p>"));
    mount_submit(&server, MOBILE_FORM_PATH, html(&rejected)).await;

    let sigaa = client(&server, Institution::Ifsc);
    let err = sigaa.login("ana", "wrong", None).await.unwrap_err();

    assert!(matches!(err, SigaaError::InvalidCredentials));
    assert!(err.is_credential_error());
    assert_eq!(count(&server, "POST", MOBILE_FORM_PATH).await, 1);
    assert_eq!(sigaa.login_state(), LoginState::Unauthenticated);
    assert_eq!(sigaa.session().login_status(), LoginStatus::Unauthenticated);

    // The rejected form page is reused instead of fetched again.
    let err = sigaa.login("ana", "still-wrong", None).await.unwrap_err();
    assert!(matches!(err, SigaaError::InvalidCredentials));
    assert_eq!(count(&server, "GET", MOBILE_FORM_PATH).await, 1);
    assert_eq!(count(&server, "POST", MOBILE_FORM_PATH).await, 2);
}

#[tokio::test]
async fn test_unrecognized_response_retried_once() {
    let server = MockServer::start().await;
    mount_form(&server, MOBILE_FORM_PATH, MOBILE_FORM).await;
    mount_submit(&server, MOBILE_FORM_PATH, html(MOBILE_FORM)).await;

    let sigaa = client(&server, Institution::Ifsc);
    let err = sigaa.login("ana", "pw", None).await.unwrap_err();

    assert!(matches!(err, SigaaError::UnrecognizedLoginResponse));
    assert!(!err.is_credential_error());
    assert_eq!(count(&server, "POST", MOBILE_FORM_PATH).await, 2);
    assert_eq!(count(&server, "GET", MOBILE_FORM_PATH).await, 2);
}

#[tokio::test]
async fn test_suspicious_behavior_is_fatal() {
    let server = MockServer::start().await;
    mount_form(&server, MOBILE_FORM_PATH, MOBILE_FORM).await;
    let flagged = format!("<html><body><p>Detectamos {SUSPICIOUS_BEHAVIOR_MARKER}.</p></body></html>");
    mount_submit(&server, MOBILE_FORM_PATH, html(&flagged)).await;

    let sigaa = client(&server, Institution::Ifsc);
    let err = sigaa.login("ana", "pw", None).await.unwrap_err();

    assert!(matches!(err, SigaaError::SuspiciousBehaviorDetected));
    assert!(!err.is_credential_error());
    assert_eq!(count(&server, "POST", MOBILE_FORM_PATH).await, 1);
    assert_eq!(count(&server, "GET", MOBILE_FORM_PATH).await, 1);
    assert_eq!(sigaa.login_state(), LoginState::Unauthenticated);
    assert_eq!(sigaa.session().login_status(), LoginStatus::Unauthenticated);
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let server = MockServer::start().await;
    mount_form(&server, MOBILE_FORM_PATH, MOBILE_FORM).await;
    Mock::given(method("POST"))
        .and(path(MOBILE_FORM_PATH))
        .respond_with(html(MOBILE_FORM))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_submit(&server, MOBILE_FORM_PATH, redirect("/sigaa/mobile/touch/menu.jsf")).await;
    mount_ifsc_landing(&server).await;

    let sigaa = client(&server, Institution::Ifsc);
    let page = sigaa.login("ana", "pw", None).await.unwrap();

    assert!(page.contains("Portal do Discente"));
    assert_eq!(count(&server, "POST", MOBILE_FORM_PATH).await, 2);
}

#[tokio::test]
async fn test_malformed_form_not_retried() {
    let server = MockServer::start().await;
    mount_form(&server, MOBILE_FORM_PATH, "<html><body>maintenance</body></html>").await;

    let sigaa = client(&server, Institution::Ifsc);
    let err = sigaa.login("ana", "pw", None).await.unwrap_err();

    assert!(matches!(err, SigaaError::MalformedForm(_)));
    assert_eq!(count(&server, "GET", MOBILE_FORM_PATH).await, 1);
}

// ─────────────────────── success ───────────────────────

#[tokio::test]
async fn test_ifsc_login_lands_on_portal() {
    let server = MockServer::start().await;
    mount_form(&server, MOBILE_FORM_PATH, MOBILE_FORM).await;
    Mock::given(method("POST"))
        .and(path(MOBILE_FORM_PATH))
        .and(body_string_contains("form-login%3Alogin=ana"))
        .and(body_string_contains("form-login%3Asenha=s3cret"))
        .and(body_string_contains("javax.faces.ViewState=j_id1"))
        .respond_with(
            redirect("/sigaa/mobile/touch/menu.jsf")
                .insert_header("set-cookie", "JSESSIONID=logged; Path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_ifsc_landing(&server).await;

    let sigaa = client(&server, Institution::Ifsc);
    let page = sigaa.login("ana", "s3cret", None).await.unwrap();

    assert_eq!(page.url().path(), "/sigaa/portais/discente/discente.jsf");
    assert_eq!(page.request().header("cookie"), Some("JSESSIONID=logged"));
    assert_eq!(sigaa.login_state(), LoginState::Authenticated);
    assert!(sigaa.session().is_authenticated());

    // The login form is requested with the mobile User-Agent.
    let requests = server.received_requests().await.unwrap();
    let form_request = requests
        .iter()
        .find(|r| r.method.as_str() == "GET" && r.url.path() == MOBILE_FORM_PATH)
        .unwrap();
    let ua = form_request.headers.get("user-agent").unwrap().to_str().unwrap();
    assert!(ua.contains("Mobile"));

    let err = sigaa.login("ana", "s3cret", None).await.unwrap_err();
    assert!(matches!(err, SigaaError::AlreadyAuthenticated));
}

#[tokio::test]
async fn test_desktop_login() {
    let server = MockServer::start().await;
    mount_form(&server, DESKTOP_FORM_PATH, DESKTOP_FORM).await;
    Mock::given(method("POST"))
        .and(path(DESKTOP_FORM_PATH))
        .and(body_string_contains("form%3Alogin=ana"))
        .and(body_string_contains("form%3Asenha=pw"))
        .respond_with(redirect("/sigaa/portais/discente/discente.jsf"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/sigaa/portais/discente/discente.jsf"))
        .respond_with(html("<h1>Portal do Discente</h1>"))
        .mount(&server)
        .await;

    let sigaa = client(&server, Institution::Ufpb);
    let page = sigaa.login("ana", "pw", None).await.unwrap();

    assert!(page.contains("Portal do Discente"));
    assert_eq!(sigaa.session().login_status(), LoginStatus::Authenticated);
}

#[tokio::test]
async fn test_desktop_invalid_credentials() {
    let server = MockServer::start().await;
    mount_form(&server, DESKTOP_FORM_PATH, DESKTOP_FORM).await;
    let rejected = DESKTOP_FORM.replace("<body>", &format!("<body><p>{INVALID_CREDENTIALS_MARKER}</p>"));
    mount_submit(&server, DESKTOP_FORM_PATH, html(&rejected)).await;

    let sigaa = client(&server, Institution::Unb);
    let err = sigaa.login("ana", "pw", None).await.unwrap_err();

    assert!(matches!(err, SigaaError::InvalidCredentials));
    assert_eq!(count(&server, "POST", DESKTOP_FORM_PATH).await, 1);
}

// ─────────────────────── challenge ───────────────────────

fn challenge_form() -> String {
    MOBILE_FORM.replace(
        "</form>",
        r#"</form><script src="https://www.google.com/recaptcha/api.js?render=site-key-1"></script>
           <script>grecaptcha.execute('site-key-1', {action: 'login'})</script>"#,
    )
}

#[tokio::test]
async fn test_challenge_requires_solver() {
    let server = MockServer::start().await;
    mount_form(&server, MOBILE_FORM_PATH, &challenge_form()).await;

    let sigaa = client(&server, Institution::Ifsc);
    let err = sigaa.login("ana", "pw", None).await.unwrap_err();

    assert!(matches!(err, SigaaError::ChallengeSolverRequired));
    assert_eq!(count(&server, "POST", MOBILE_FORM_PATH).await, 0);
}

#[tokio::test]
async fn test_challenge_token_is_submitted() {
    let server = MockServer::start().await;
    mount_form(&server, MOBILE_FORM_PATH, &challenge_form()).await;
    Mock::given(method("POST"))
        .and(path(MOBILE_FORM_PATH))
        .and(body_string_contains("g-recaptcha-response=tok-1"))
        .respond_with(redirect("/sigaa/mobile/touch/menu.jsf"))
        .expect(1)
        .mount(&server)
        .await;
    mount_ifsc_landing(&server).await;

    let solver = RecordingSolver::new();
    let sigaa = client(&server, Institution::Ifsc);
    sigaa.login("ana", "pw", Some(&solver)).await.unwrap();

    assert_eq!(solver.calls(), vec![("site-key-1".to_string(), "login".to_string())]);
}

#[tokio::test]
async fn test_failed_challenge_retried_with_fresh_token() {
    let server = MockServer::start().await;
    mount_form(&server, MOBILE_FORM_PATH, &challenge_form()).await;
    let refused = challenge_form().replace("</form>", &format!("</form><p>{CHALLENGE_FAILED_MARKER}</p>"));
    mount_submit(&server, MOBILE_FORM_PATH, html(&refused)).await;

    let solver = RecordingSolver::new();
    let sigaa = client(&server, Institution::Ifsc);
    let err = sigaa.login("ana", "pw", Some(&solver)).await.unwrap_err();

    assert!(matches!(err, SigaaError::ChallengeFailed));
    assert_eq!(solver.calls().len(), 2);
    assert_eq!(count(&server, "POST", MOBILE_FORM_PATH).await, 2);
}
