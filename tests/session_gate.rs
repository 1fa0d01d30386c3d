use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use authflow::flow::{AuthResult, Claims, Flow};
use authflow::gate::{Handler, SessionGate};
use authflow::session::{InMemorySessions, Session, Sessions};
use authflow::web::{Request, Response};
use authflow::{AuthError, FixedEntropy};
use serde_json::{Map, Value, json};

/// Flow double: either immediately yields a result, or redirects to an SSO.
struct TestFlow {
    result: Option<Map<String, Value>>,
    refresh: Option<Result<Map<String, Value>, ()>>,
    refreshed: Arc<AtomicUsize>,
}

impl TestFlow {
    fn redirecting() -> Self {
        TestFlow { result: None, refresh: None, refreshed: Arc::default() }
    }

    fn yielding(result: Map<String, Value>) -> Self {
        TestFlow { result: Some(result), refresh: None, refreshed: Arc::default() }
    }

    fn refreshing(refresh: Result<Map<String, Value>, ()>) -> Self {
        TestFlow { result: None, refresh: Some(refresh), refreshed: Arc::default() }
    }
}

#[async_trait]
impl Flow for TestFlow {
    async fn authenticate(
        &self,
        _request: &Request,
        response: &mut Response,
        session: &dyn Session,
    ) -> Result<Option<AuthResult>, AuthError> {
        match &self.result {
            Some(result) => Ok(Some(AuthResult::Attributes(result.clone()))),
            None => {
                session.transmit(response);
                response.answer(302);
                response.header("Location", "https://sso.example.com/");
                Ok(None)
            }
        }
    }

    async fn refresh(&self, _claims: &Claims) -> Result<Option<AuthResult>, AuthError> {
        self.refreshed.fetch_add(1, Ordering::Relaxed);
        match &self.refresh {
            Some(Ok(result)) => Ok(Some(AuthResult::Attributes(result.clone()))),
            Some(Err(())) => Err(AuthError::ExchangeFailed { status: 400, body: "nope".into() }),
            None => Ok(None),
        }
    }
}

/// Handler double recording whether it ran and what it saw.
#[derive(Default)]
struct Recorder {
    invoked: AtomicUsize,
    user: Mutex<Option<Value>>,
    token: Mutex<Option<Value>>,
}

#[async_trait]
impl Handler for Recorder {
    async fn handle(&self, request: &Request, _response: &mut Response) {
        self.invoked.fetch_add(1, Ordering::Relaxed);
        *self.user.lock().unwrap() = request.value("user").cloned();
        *self.token.lock().unwrap() = request.value("token").cloned();
    }
}

fn user() -> Map<String, Value> {
    json!({"username": "test"}).as_object().unwrap().clone()
}

fn cookie_for(session: &dyn Session) -> String {
    format!("session={}", session.id())
}

#[tokio::test]
async fn redirects_to_sso_without_session() {
    let gate = SessionGate::new(TestFlow::redirecting(), InMemorySessions::new());
    let recorder = Recorder::default();
    let mut request = Request::get("/");
    let mut response = Response::new();

    gate.guard(&mut request, &mut response, &recorder).await.unwrap();

    assert_eq!(302, response.status());
    assert_eq!(
        "https://sso.example.com/",
        response.header_value("Location").unwrap(),
    );
    assert_eq!(0, recorder.invoked.load(Ordering::Relaxed));
}

#[tokio::test]
async fn redirects_for_top_level_navigations() {
    for mode in [Some("navigate"), None] {
        let gate = SessionGate::new(TestFlow::redirecting(), InMemorySessions::new());
        let recorder = Recorder::default();
        let mut request = Request::get("/");
        if let Some(mode) = mode {
            request = request.with_header("Sec-Fetch-Mode", mode);
        }
        let mut response = Response::new();

        gate.guard(&mut request, &mut response, &recorder).await.unwrap();

        assert_eq!(302, response.status());
    }
}

#[tokio::test]
async fn answers_401_for_subrequests() {
    for mode in ["cors", "no-cors", "same-origin", "websocket"] {
        let gate = SessionGate::new(TestFlow::redirecting(), InMemorySessions::new());
        let recorder = Recorder::default();
        let mut request = Request::get("/").with_header("Sec-Fetch-Mode", mode);
        let mut response = Response::new();

        gate.guard(&mut request, &mut response, &recorder).await.unwrap();

        assert_eq!(401, response.status());
        assert_eq!(Some("Authentication required"), response.body_str());
        assert_eq!(0, recorder.invoked.load(Ordering::Relaxed));
    }
}

#[tokio::test]
async fn passes_stored_user_to_handler() {
    let sessions = InMemorySessions::new();
    let session = sessions.create();
    session.register("auth", json!([null, {"username": "test"}]));

    let gate = SessionGate::new(TestFlow::redirecting(), sessions);
    let recorder = Recorder::default();
    let mut request = Request::get("/").with_header("Cookie", cookie_for(&*session));
    let mut response = Response::new();

    gate.guard(&mut request, &mut response, &recorder).await.unwrap();

    assert_eq!(1, recorder.invoked.load(Ordering::Relaxed));
    assert_eq!(
        json!({"username": "test"}),
        recorder.user.lock().unwrap().clone().unwrap(),
    );
}

#[tokio::test]
async fn authenticates_then_passes_user_and_token() {
    let gate = SessionGate::new(TestFlow::yielding(user()), InMemorySessions::new())
        .with_entropy(Arc::new(FixedEntropy::new([0xab])));
    let recorder = Recorder::default();
    let mut request = Request::get("/");
    let mut response = Response::new();

    gate.guard(&mut request, &mut response, &recorder).await.unwrap();

    assert_eq!(1, recorder.invoked.load(Ordering::Relaxed));
    assert_eq!(
        json!({"username": "test"}),
        recorder.user.lock().unwrap().clone().unwrap(),
    );

    // Anti-fixation token: 32 fixed bytes, base64
    let token = recorder.token.lock().unwrap().clone().unwrap();
    let token = token.as_str().unwrap().to_string();
    use base64::Engine;
    assert_eq!(
        vec![0xab; 32],
        base64::engine::general_purpose::STANDARD.decode(&token).unwrap(),
    );
}

#[tokio::test]
async fn persists_principal_in_session() {
    let sessions = InMemorySessions::new();
    let gate = SessionGate::new(TestFlow::yielding(user()), sessions.clone());
    let recorder = Recorder::default();
    let mut request = Request::get("/");
    let mut response = Response::new();

    gate.guard(&mut request, &mut response, &recorder).await.unwrap();

    // The transmitted cookie references a session holding the principal
    let cookie = response.header_value("Set-Cookie").unwrap().to_string();
    let next = Request::get("/").with_header("Cookie", cookie);
    let session = sessions.locate(&next).unwrap();
    assert_eq!(
        json!([null, {"username": "test"}]),
        session.value("auth").unwrap(),
    );
}

#[tokio::test]
async fn lookup_maps_result_to_principal() {
    let gate = SessionGate::new(TestFlow::yielding(user()), InMemorySessions::new())
        .lookup(|result| json!({"id": 6100, "source": result.to_value()["username"]}));
    let recorder = Recorder::default();
    let mut request = Request::get("/");
    let mut response = Response::new();

    gate.guard(&mut request, &mut response, &recorder).await.unwrap();

    assert_eq!(
        json!({"id": 6100, "source": "test"}),
        recorder.user.lock().unwrap().clone().unwrap(),
    );
}

#[tokio::test]
async fn session_is_transmitted_when_redirecting() {
    let sessions = InMemorySessions::new();
    let gate = SessionGate::new(TestFlow::redirecting(), sessions);
    let recorder = Recorder::default();
    let mut request = Request::get("/");
    let mut response = Response::new();

    gate.guard(&mut request, &mut response, &recorder).await.unwrap();

    assert!(response.header_value("Set-Cookie").is_some());
}

#[tokio::test]
async fn refreshes_expired_claims() {
    let sessions = InMemorySessions::new();
    let session = sessions.create();
    session.register(
        "auth",
        json!([{"expires": 1000, "refresh": "<R>"}, {"username": "stale"}]),
    );

    let flow = TestFlow::refreshing(Ok(json!({"username": "fresh"}).as_object().unwrap().clone()));
    let gate = SessionGate::new(flow, sessions);
    let recorder = Recorder::default();
    let mut request = Request::get("/").with_header("Cookie", cookie_for(&*session));
    let mut response = Response::new();

    gate.guard(&mut request, &mut response, &recorder).await.unwrap();

    assert_eq!(
        json!({"username": "fresh"}),
        recorder.user.lock().unwrap().clone().unwrap(),
    );
    assert_eq!(json!([null, {"username": "fresh"}]), session.value("auth").unwrap());
}

#[tokio::test]
async fn failed_refresh_falls_back_to_reauthentication() {
    let sessions = InMemorySessions::new();
    let session = sessions.create();
    session.register(
        "auth",
        json!([{"expires": 1000, "refresh": "<R>"}, {"username": "stale"}]),
    );

    let flow = TestFlow::refreshing(Err(()));
    let gate = SessionGate::new(flow, sessions);
    let recorder = Recorder::default();
    let mut request = Request::get("/").with_header("Cookie", cookie_for(&*session));
    let mut response = Response::new();

    gate.guard(&mut request, &mut response, &recorder).await.unwrap();

    // The refreshing flow has no result, so the user lands in the login
    // redirect instead of the handler
    assert_eq!(302, response.status());
    assert_eq!(0, recorder.invoked.load(Ordering::Relaxed));
}

#[tokio::test]
async fn valid_claims_skip_refresh_result() {
    let sessions = InMemorySessions::new();
    let session = sessions.create();
    session.register("auth", json!([null, {"username": "test"}]));

    let flow = TestFlow::refreshing(Ok(user()));
    let refreshed = flow.refreshed.clone();
    let gate = SessionGate::new(flow, sessions);
    let recorder = Recorder::default();
    let mut request = Request::get("/").with_header("Cookie", cookie_for(&*session));
    let mut response = Response::new();

    gate.guard(&mut request, &mut response, &recorder).await.unwrap();

    // No claims stored, so refresh is never consulted
    assert_eq!(0, refreshed.load(Ordering::Relaxed));
    assert_eq!(1, recorder.invoked.load(Ordering::Relaxed));
}

#[tokio::test]
async fn optional_without_session_proceeds_anonymously() {
    let gate = SessionGate::new(TestFlow::redirecting(), InMemorySessions::new());
    let recorder = Recorder::default();
    let mut request = Request::get("/");
    let mut response = Response::new();

    gate.optional(&mut request, &mut response, &recorder).await.unwrap();

    assert_eq!(1, recorder.invoked.load(Ordering::Relaxed));
    assert!(recorder.user.lock().unwrap().is_none());
}

#[tokio::test]
async fn optional_with_authenticated_session_passes_user() {
    let sessions = InMemorySessions::new();
    let session = sessions.create();
    session.register("auth", json!([null, {"username": "test"}]));

    let gate = SessionGate::new(TestFlow::redirecting(), sessions);
    let recorder = Recorder::default();
    let mut request = Request::get("/").with_header("Cookie", cookie_for(&*session));
    let mut response = Response::new();

    gate.optional(&mut request, &mut response, &recorder).await.unwrap();

    assert_eq!(
        json!({"username": "test"}),
        recorder.user.lock().unwrap().clone().unwrap(),
    );
}

#[tokio::test]
async fn context_exposes_user_and_logout() {
    let sessions = InMemorySessions::new();
    let gate = SessionGate::new(TestFlow::yielding(user()), sessions.clone());

    struct ContextProbe {
        seen: Mutex<Option<Value>>,
    }

    #[async_trait]
    impl Handler for ContextProbe {
        async fn handle(&self, request: &Request, response: &mut Response) {
            let context = request.context().unwrap();
            *self.seen.lock().unwrap() = context.user();
            context.logout(response);
        }
    }

    let probe = ContextProbe { seen: Mutex::new(None) };
    let mut request = Request::get("/");
    let mut response = Response::new();
    gate.guard(&mut request, &mut response, &probe).await.unwrap();

    assert_eq!(json!({"username": "test"}), probe.seen.lock().unwrap().clone().unwrap());

    // Logged out: the transmitted session no longer exists
    let cookie = response.header_value("Set-Cookie").unwrap().to_string();
    let next = Request::get("/").with_header("Cookie", cookie);
    assert!(sessions.locate(&next).is_none());
}
