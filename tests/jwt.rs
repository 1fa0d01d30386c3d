use authflow::JwtError;
use authflow::oauth::Jwt;
use jsonwebtoken::{DecodingKey, EncodingKey};
use serde_json::{Map, Value, json};

const PRIVATE_KEY: &[u8] = include_bytes!("keys/private.pem");
const PUBLIC_KEY: &[u8] = include_bytes!("keys/public.pem");

/// RS256 token over `{"iss":"xp-testing","sub":"test"}` signed with the test
/// key, produced independently with openssl.
const TOKEN: &str = concat!(
    "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.eyJpc3MiOiJ4cC10ZXN0aW5nI",
    "iwic3ViIjoidGVzdCJ9.LAI3asY6s3ObdWchBYmVBh4hVNztWlTLAdKA-6fqYx",
    "tsouo90G9q0OXQ26axz9j0CbQ-nLBeDVSQ4c1ay69Ot13OnGsBSL1mT9WVgCyu",
    "JUInDCtD34j3hefqmVz4lVK6-QI7jpSCeff-W-T3rom7-atnQ3UZBNlX3CBzNi",
    "ZDMA1WRubcbfKjD0D8D6hSxq7LL0YrDhC8xvAtlzB3NMZUDJ56GAG1tAIAuMsP",
    "8iQFQNp97Wxa-13Z08etsdhj5-mZvY0251NOa3EUe2ykwh9FSLowUqX0aNppPI",
    "8sVGVsfoiu2DyElLBNcya6_sN4xm7otS3vA-prNRg66SUn-7QGWw",
);

fn header() -> Map<String, Value> {
    json!({"alg": "RS256", "typ": "JWT"})
        .as_object()
        .unwrap()
        .clone()
}

fn payload() -> Map<String, Value> {
    json!({"iss": "xp-testing", "sub": "test"})
        .as_object()
        .unwrap()
        .clone()
}

#[test]
fn encode_is_base64url_without_padding() {
    assert_eq!("VGVzdA", Jwt::encode(b"Test"));
    assert_eq!("-w", Jwt::encode(&[0xfb]));
    assert_eq!("_w", Jwt::encode(&[0xff]));
}

#[test]
fn decode_reverses_encode() {
    assert_eq!(b"Test".to_vec(), Jwt::decode("VGVzdA").unwrap());
    assert_eq!(vec![0xfb], Jwt::decode("-w").unwrap());
    assert_eq!(vec![0xff], Jwt::decode("_w").unwrap());
}

#[test]
fn header_accessor() {
    assert_eq!(&header(), Jwt::new(header(), Map::new()).header());
}

#[test]
fn alg_defaults_to_rs256() {
    let without_alg = json!({"typ": "JWT"}).as_object().unwrap().clone();
    assert_eq!(&header(), Jwt::new(without_alg, Map::new()).header());
}

#[test]
fn payload_accessor() {
    assert_eq!(&payload(), Jwt::new(header(), payload()).payload());
}

#[test]
fn claim_accessor() {
    let jwt = Jwt::new(header(), json!({"iat": 6100, "name": "Test"}).as_object().unwrap().clone());
    assert_eq!(Some(&json!(6100)), jwt.claim("iat"));
    assert_eq!(Some(&json!("Test")), jwt.claim("name"));
    assert_eq!(None, jwt.claim("loggedInAs"));
}

#[test]
fn sign_matches_known_token() {
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY).unwrap();
    assert_eq!(TOKEN, Jwt::new(header(), payload()).sign(&key).unwrap());
}

#[test]
fn verify_returns_original_jwt() {
    let key = DecodingKey::from_rsa_pem(PUBLIC_KEY).unwrap();
    assert_eq!(Jwt::new(header(), payload()), Jwt::verify(TOKEN, &key).unwrap());
}

#[test]
fn sign_then_verify_roundtrip() {
    let signing = EncodingKey::from_rsa_pem(PRIVATE_KEY).unwrap();
    let verifying = DecodingKey::from_rsa_pem(PUBLIC_KEY).unwrap();
    let jwt = Jwt::new(header(), json!({"sub": "roundtrip", "n": 42}).as_object().unwrap().clone());

    let token = jwt.sign(&signing).unwrap();
    assert_eq!(jwt, Jwt::verify(&token, &verifying).unwrap());
}

#[test]
fn verify_rejects_malformed_tokens() {
    let key = DecodingKey::from_rsa_pem(PUBLIC_KEY).unwrap();
    let cases: &[(&str, fn(&JwtError) -> bool)] = &[
        ("", |e| matches!(e, JwtError::Malformed)),
        ("a.b", |e| matches!(e, JwtError::Malformed)),
        ("a.b.c.d", |e| matches!(e, JwtError::Malformed)),
        ("a.b.c", |e| matches!(e, JwtError::HeaderParsing(_))),
        ("e30.b.c", |e| matches!(e, JwtError::UnsupportedAlgorithm(None))),
        ("eyJhbGciOiJSUzI1NiJ9.b.c", |e| matches!(e, JwtError::PayloadParsing(_))),
        ("eyJhbGciOiJIUzI1NiJ9.b.c", |e| {
            matches!(e, JwtError::UnsupportedAlgorithm(Some(alg)) if alg == "HS256")
        }),
        ("eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.e30.c", |e| {
            matches!(e, JwtError::SignatureMismatch)
        }),
    ];

    for (token, expected) in cases {
        let error = Jwt::verify(token, &key).unwrap_err();
        assert!(expected(&error), "{token}: {error}");
    }
}

#[test]
fn verify_error_messages_are_diagnosable() {
    let key = DecodingKey::from_rsa_pem(PUBLIC_KEY).unwrap();
    assert_eq!(
        "Expected [header].[payload].[signature]",
        Jwt::verify("a.b", &key).unwrap_err().to_string(),
    );
    assert_eq!(
        "Unsupported algorithm (null)",
        Jwt::verify("e30.b.c", &key).unwrap_err().to_string(),
    );
    assert_eq!(
        "Unsupported algorithm HS256",
        Jwt::verify("eyJhbGciOiJIUzI1NiJ9.b.c", &key).unwrap_err().to_string(),
    );
}

#[test]
fn tampered_segments_fail_with_signature_mismatch() {
    let key = DecodingKey::from_rsa_pem(PUBLIC_KEY).unwrap();
    let payload = Jwt::encode(br#"{"iss":"attacker","sub":"test"}"#);
    let tampered = {
        let mut segments: Vec<&str> = TOKEN.split('.').collect();
        segments[1] = &payload;
        segments.join(".")
    };

    assert!(matches!(
        Jwt::verify(&tampered, &key).unwrap_err(),
        JwtError::SignatureMismatch,
    ));
}

#[test]
fn try_verify_collapses_failures_to_none() {
    let key = DecodingKey::from_rsa_pem(PUBLIC_KEY).unwrap();
    assert!(Jwt::try_verify(TOKEN, &key).is_some());
    assert!(Jwt::try_verify("a.b.c", &key).is_none());
}
