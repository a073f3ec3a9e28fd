//! Well-known context entries and step parameter names.

use crate::actor::{ClientInfo, IssuedTokens, ProviderMetadata};
use crate::barrier::Barrier;
use crate::types::Role;
use crate::verdict::Verdict;

use super::types::ContextKey;

// Suite scope

/// Set once a step finished with a conclusive verdict.
pub const STEP_COMPLETED: ContextKey<bool> = ContextKey::new("suite.step-completed");

/// Client registered at the honest OP, reused across steps.
pub const OP_HONEST_CLIENT: ContextKey<ClientInfo> =
    ContextKey::new("op.registered-client-info-honest");

pub const RP_DISCOVERED_METADATA: ContextKey<ProviderMetadata> =
    ContextKey::new("rp.discovered-op-config");
pub const RP_HONEST_CLIENT: ContextKey<ClientInfo> = ContextKey::new("rp.1-registered-client-info");
pub const RP_EVIL_CLIENT: ContextKey<ClientInfo> = ContextKey::new("rp.2-registered-client-info");
pub const RP_USER1_ID_TOKEN: ContextKey<String> = ContextKey::new("rp.stored-idtoken-user1");
pub const RP_USER2_ID_TOKEN: ContextKey<String> = ContextKey::new("rp.stored-idtoken-user2");

// Step scope, OP actors

pub const OP_EVIL_CLIENT: ContextKey<ClientInfo> =
    ContextKey::new("op.registered-client-info-evil");
pub const AUTH_REQ_NONCE: ContextKey<String> = ContextKey::new("op.auth-req-nonce");
pub const HONEST_CODE: ContextKey<String> = ContextKey::new("op.honest-code");
pub const HONEST_ACCESS_TOKEN: ContextKey<String> = ContextKey::new("op.honest-access-token");
pub const AUTH_REQ_HONEST_NONCE: ContextKey<String> = ContextKey::new("op.auth-req-honest-nonce");
pub const AUTH_REQ_HONEST_STATE: ContextKey<String> = ContextKey::new("op.auth-req-honest-state");
/// Path fragment forcing the target into fresh discovery and registration.
pub const REGISTRATION_FRAGMENT: ContextKey<String> =
    ContextKey::new("op.registration-enforcing-path-fragment");
pub const UNTRUSTED_KEY_REQUESTED: ContextKey<bool> = ContextKey::new("op.untrusted-key-requested");
pub const MULTI_PART_FINISHED: ContextKey<bool> = ContextKey::new("op.multi-part-test-finished");
/// Claimed by whichever OP receives the first authorization request.
pub const FIRST_AUTH_CLAIMED: ContextKey<bool> = ContextKey::new("op.first-auth-request-claimed");

pub const TOKEN_LEAK: ContextKey<Barrier<Option<Verdict>>> =
    ContextKey::new("op.token-information-leak");
pub const USERINFO_LEAK: ContextKey<Barrier<Option<Verdict>>> =
    ContextKey::new("op.userinfo-information-leak");
/// Honest OP saw the probing authorization request.
pub const HONEST_AUTH_SEEN: ContextKey<Barrier<()>> =
    ContextKey::new("op.block-browser-waiting-for-honest");
/// Second authorization request arrived, the held first response may go out.
pub const SECOND_AUTH_SEEN: ContextKey<Barrier<()>> = ContextKey::new("op.block-op");
pub const STEP_RESULT: ContextKey<Barrier<Verdict>> =
    ContextKey::new("op.block-browser-and-test-result");
/// First authorization request of an invalid state run was captured.
pub const RELOAD_BROWSER: ContextKey<Barrier<()>> = ContextKey::new("op.reload-browser-future");
/// Browser finished its second login, the held OP may answer.
pub const RELEASE_OP: ContextKey<Barrier<()>> = ContextKey::new("op.block-op-future");
/// OP that answered a token request during the step.
pub const TOKEN_REQUEST_RECEIVED: ContextKey<Role> = ContextKey::new("op.token-request-received");
/// OP that answered a UserInfo request during the step.
pub const USERINFO_REQUEST_RECEIVED: ContextKey<Role> =
    ContextKey::new("op.userinfo-request-received");

// Step scope, RP actors

pub const RP_HONEST_AUTHN_REQUEST: ContextKey<String> = ContextKey::new("rp.prepared-rp1-authnreq");
pub const RP_EVIL_AUTHN_REQUEST: ContextKey<String> = ContextKey::new("rp.prepared-rp2-authnreq");
pub const RP_HONEST_REDIRECT_URI: ContextKey<String> = ContextKey::new("rp.rp1-redirect-uri");
pub const RP_EVIL_REDIRECT_URI: ContextKey<String> = ContextKey::new("rp.rp2-redirect-uri");
pub const RP_HONEST_STATE: ContextKey<String> = ContextKey::new("rp.rp1-state");
pub const RP_EVIL_STATE: ContextKey<String> = ContextKey::new("rp.rp2-state");
pub const LAST_BROWSER_URL: ContextKey<String> = ContextKey::new("rp.last-url-seen-in-browser");
pub const STORED_AUTH_CODE: ContextKey<String> = ContextKey::new("rp.stored-auth-code");
pub const RP_LAST_TOKENS: ContextKey<IssuedTokens> = ContextKey::new("rp.last-issued-tokens");
/// `sub` of the first user, stored before the sub claim spoofing login.
pub const STORED_USER1_SUB: ContextKey<String> = ContextKey::new("rp.stored-user1-sub");
/// Random label injected into a manipulated redirect URI.
pub const REDIRECT_URI_MANIPULATOR: ContextKey<String> =
    ContextKey::new("rp.redirect-uri-manipulator");
pub const PKCE_FIRST_VERIFIER: ContextKey<String> = ContextKey::new("rp.pkce-first-verifier");
pub const PKCE_VERIFIER: ContextKey<String> = ContextKey::new("rp.pkce-current-verifier");
/// Browser confirmed the final URL, the callback may evaluate it.
pub const BROWSER_FINISHED: ContextKey<Barrier<()>> = ContextKey::new("rp.block-rp-for-browser");
pub const RP_RESULT: ContextKey<Barrier<Verdict>> =
    ContextKey::new("rp.block-browser-for-rp-testresult");

/// Step and actor parameter names.
pub mod params {
    pub const GRANT_NOT_NEEDED: &str = "grant_not_needed";
    pub const REGISTRATION_NEEDED: &str = "dynamic_client_registration_support_needed";

    pub const BROWSER_INPUT_OP_URL: &str = "browser_input_op_url";
    pub const BROWSER_INPUT_HONEST_OP_URL: &str = "browser_input_honest-op_url";
    pub const BROWSER_INPUT_EVIL_OP_URL: &str = "browser_input_evil-op_url";

    pub const USE_EVIL_NEEDLE: &str = "use_evil_needle";
    pub const FORCE_SUCCESS_URL_FAILS: &str = "force_success_url_fails";
    pub const FORCE_UNTRUSTED_KEY_REQUEST_FAILS: &str = "request_to_untrusted_key_uri_fails_test";

    pub const FORCE_HONEST_DISCOVERY_ISS: &str = "force_honest_discovery_iss";
    pub const FORCE_HONEST_DISCOVERY_TOKEN_EP: &str = "force_honest_discovery_tokenEP";
    pub const FORCE_HONEST_DISCOVERY_USERINFO_EP: &str = "force_honest_discovery_userinfoEP";
    pub const FORCE_HONEST_TOKEN_ISS: &str = "force_honest_idtoken_iss";
    pub const FORCE_HONEST_TOKEN_SUB: &str = "force_honest_idtoken_sub";
    pub const FORCE_TOKEN_EXP_DAY: &str = "force_idtoken_exp_oneday";
    pub const FORCE_TOKEN_NONCE_INVALID: &str = "force_idtoken_nonce_invalidValue";
    pub const FORCE_TOKEN_NONCE_EXCL: &str = "force_idtoken_nonce_excluded";
    pub const FORCE_TOKEN_AUD_INVALID: &str = "force_idtoken_aud_invalidValue";
    pub const FORCE_TOKEN_SIG_INVALID: &str = "force_idtoken_signature_invalidValue";
    pub const FORCE_TOKEN_SIG_NONE: &str = "force_idtoken_header_alg_none";
    pub const FORCE_REGISTER_HONEST_CLIENTID: &str = "force_register_honest_client_id";

    pub const TARGET_OP_URL: &str = "rp.op_target_url";
    pub const IS_RP_LEARNING_STEP: &str = "rp.is_learning_teststep";
    pub const CURRENT_USER_USERNAME: &str = "current_user_username";
    pub const CURRENT_USER_PASSWORD: &str = "current_user_password";
    pub const IS_SINGLE_RP_TEST: &str = "is_single_rp_test";
    pub const SCRIPT_EXEC_EXCEPTION_FAILS_TEST: &str = "script_exception_fails_test";
    pub const AUTH_ERROR_FAILS_TEST: &str = "authentication-error-response-fails-test";
    pub const TOKEN_RECEIVAL_FAILS_TEST: &str = "code-redemption-fails-test";
    pub const USER2_IN_USERINFO_FAILS_TEST: &str = "username2-in-userinforesponse-fails-test";
    pub const FORCE_NO_REDEEM_AUTH_CODE: &str = "force-no-redeem-auth-code";

    pub const FORCE_STATE_INVALID: &str = "force_state_invalidValue";
    pub const FORCE_STATE_OTHER_SESSION: &str = "force_state_fromotherSession";
    pub const FORCE_TOKEN_HONEST_AUD: &str = "force_idtoken_honest_aud";
    pub const FORCE_TOKEN_REQUEST_FAILS: &str = "force_token_requested_fails";
    pub const FORCE_USERINFO_REQUEST_FAILS: &str = "force_userinfo_requested_fails";

    pub const USERINFO_HONEST_SUB: &str = "include_honest_sub_in_userinfo";
    pub const USERINFO_EVIL_SUB: &str = "include_evil_sub_in_userinfo";
    pub const USERINFO_SUB_AS_ARRAY: &str = "include_sub_claims_as_json_array";
    pub const USERINFO_HONEST_ISS: &str = "include_honest_iss_in_userinfo";
    pub const USERINFO_EVIL_ISS: &str = "include_evil_iss_in_userinfo";
    pub const USERINFO_HONEST_NAME: &str = "force_honest_userinfo_name";
    pub const USERINFO_HONEST_USERNAME: &str = "force_honest_userinfo_username";
    pub const USERINFO_HONEST_EMAIL: &str = "force_honest_userinfo_email";
    pub const TOKEN_HEADER_ADD_CLAIMS: &str = "token_header_add_claims";
    pub const TOKEN_HEADER_HONEST_SUB: &str = "force_token_header_honest_sub";
    pub const TOKEN_HEADER_HONEST_ISS: &str = "force_token_header_honest_iss";
    pub const TOKEN_HEADER_HONEST_EMAIL: &str = "force_token_header_honest_email";
    pub const TOKEN_HEADER_SIGNING_KEY: &str = "include_signing_certificate";

    pub const KEY_SPOOFED_JWK: &str = "idtoken_spoofed_jwk";
    pub const KEY_SPOOFED_X5C: &str = "idtoken_spoofed_x5c";
    pub const KEY_FRESH_KID: &str = "include_fresh_keyid_in_jwt_and_jwk";
    pub const KEY_JKU_AS_KID: &str = "force_spoofed_jku_as_kid";

    pub const CLAIMSREQ_USER1_SUB: &str = "authnreq-add-claimsreq-user1-sub";
    pub const CLAIMSREQ_ARRAY_USER1_SUB: &str = "authnreq-add-claimsreq-array-user1-sub";
    pub const CLAIMSREQ_ARRAY_SUB1_SUB2: &str = "authnreq-add-claimsreq-array-sub1-sub2";
    pub const CLAIMSREQ_ARRAY_SUB2_SUB1: &str = "authnreq-add-claimsreq-array-sub2-sub1";
    pub const ID_TOKEN_HINT_USER1: &str = "authnreq-add-id_token_hint-user1";

    pub const RUM_EVIL_REDIRECT_URI: &str = "authnreq-force-evil-redirect-uri";
    pub const RUM_SUBDOMAIN: &str = "authnreq-random-subdomain-in-redirect-uri";
    pub const RUM_PATH_SUFFIX: &str = "authnreq-random-path-suffix-in-redirect-uri";
    pub const RUM_INVALID_TLD: &str = "authnreq-invalid-top-level-domain-in-redirect-uri";

    pub const PKCE_VERIFIER_EXCLUDED: &str = "tokenreq-pkce-verifier-excluded";
    pub const PKCE_VERIFIER_INVALID: &str = "tokenreq-invalid-pkce-verifier";
    pub const PKCE_FROM_OTHER_SESSION: &str = "tokenreq-pkce-from-other-session";
    pub const PKCE_METHOD_PLAIN: &str = "tokenreq-add-pkce-method-param-plain";
}
