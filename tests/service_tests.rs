//! 认证服务测试
//! 使用内存存储以及模拟故障的存储

use async_trait::async_trait;
use book_api::{
    auth::{JwtService, PasswordHasher},
    models::{
        auth::{LoginRequest, SignupRequest},
        user::{NewIdentity, UserIdentity},
    },
    repository::{CredentialStore, InMemoryCredentialStore, StoreError},
    services::{AuthError, AuthService},
};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

const SECRET: &str = "test-secret-key-for-testing-only-min-32-chars";

fn build_service(store: Arc<dyn CredentialStore>, store_timeout: Duration) -> AuthService {
    AuthService::new(
        store,
        Arc::new(PasswordHasher::with_params(4096, 1, 1).unwrap()),
        Arc::new(JwtService::from_secret(SECRET).unwrap()),
        chrono::Duration::minutes(5),
        store_timeout,
    )
}

fn signup_req(handle: &str, password: &str) -> SignupRequest {
    SignupRequest {
        handle: handle.to_string(),
        password: password.to_string(),
    }
}

fn login_req(handle: &str, password: &str) -> LoginRequest {
    LoginRequest {
        handle: handle.to_string(),
        password: password.to_string(),
    }
}

/// 每个操作都睡眠超过超时时间
struct SlowStore {
    delay: Duration,
}

#[async_trait]
impl CredentialStore for SlowStore {
    async fn insert(&self, identity: NewIdentity) -> Result<UserIdentity, StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(identity.into())
    }

    async fn find_by_handle(&self, _handle: &str) -> Result<Option<UserIdentity>, StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }

    async fn find_by_id(&self, _id: &Uuid) -> Result<Option<UserIdentity>, StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// 所有操作立即失败
struct BrokenStore;

#[async_trait]
impl CredentialStore for BrokenStore {
    async fn insert(&self, _identity: NewIdentity) -> Result<UserIdentity, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn find_by_handle(&self, _handle: &str) -> Result<Option<UserIdentity>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn find_by_id(&self, _id: &Uuid) -> Result<Option<UserIdentity>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_signup_then_login() {
    let store = Arc::new(InMemoryCredentialStore::new());
    let service = build_service(store.clone(), Duration::from_secs(2));

    let user = service.signup(signup_req("a@b.com", "pw1")).await.unwrap();
    assert_eq!(user.handle, "a@b.com");
    assert_ne!(user.password_digest, "pw1");
    assert!(user.password_digest.starts_with("$argon2id$"));

    let session = service.login(login_req("a@b.com", "pw1")).await.unwrap();
    assert_eq!(session.user_id, user.id);
    assert!(!session.token.is_empty());

    let me = service.authenticate(&session.token).await.unwrap();
    assert_eq!(me.id, user.id);
}

#[tokio::test]
async fn test_padded_handle_is_normalized_before_validation() {
    let service = build_service(Arc::new(InMemoryCredentialStore::new()), Duration::from_secs(2));

    let user = service.signup(signup_req("  Reader@Books.COM ", "pw")).await.unwrap();
    assert_eq!(user.handle, "reader@books.com");

    let session = service.login(login_req(" READER@books.com", "pw")).await.unwrap();
    assert_eq!(session.user_id, user.id);

    assert!(matches!(
        service.login(login_req("   ", "pw")).await,
        Err(AuthError::Validation(_))
    ));
}

#[tokio::test]
async fn test_duplicate_signup_leaves_store_unchanged() {
    let store = Arc::new(InMemoryCredentialStore::new());
    let service = build_service(store.clone(), Duration::from_secs(2));

    let first = service.signup(signup_req("a@b.com", "pw1")).await.unwrap();
    let second = service.signup(signup_req("A@B.com", "pw2")).await;

    assert_eq!(second.unwrap_err(), AuthError::DuplicateHandle);
    assert_eq!(store.len(), 1);

    // 原始凭据仍然有效，新密码无效
    let session = service.login(login_req("a@b.com", "pw1")).await.unwrap();
    assert_eq!(session.user_id, first.id);
    assert_eq!(
        service.login(login_req("a@b.com", "pw2")).await.unwrap_err(),
        AuthError::InvalidCredentials
    );
}

#[tokio::test]
async fn test_concurrent_signups_have_single_winner() {
    let store = Arc::new(InMemoryCredentialStore::new());
    let service = Arc::new(build_service(store.clone(), Duration::from_secs(5)));

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.signup(signup_req("race@b.com", &format!("pw{}", i))).await
        }));
    }

    let mut created = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(AuthError::DuplicateHandle) => duplicates += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let service = build_service(Arc::new(InMemoryCredentialStore::new()), Duration::from_secs(2));
    service.signup(signup_req("known@b.com", "right")).await.unwrap();

    let unknown = service.login(login_req("nobody@b.com", "right")).await.unwrap_err();
    let wrong = service.login(login_req("known@b.com", "wrong")).await.unwrap_err();

    assert_eq!(unknown, AuthError::InvalidCredentials);
    assert_eq!(unknown, wrong);
    assert_eq!(unknown.to_string(), wrong.to_string());
}

#[tokio::test]
async fn test_validation_errors() {
    let service = build_service(Arc::new(InMemoryCredentialStore::new()), Duration::from_secs(2));

    assert!(matches!(
        service.signup(signup_req("not-an-email", "pw")).await,
        Err(AuthError::Validation(_))
    ));
    assert!(matches!(
        service.signup(signup_req("a@b.com", "")).await,
        Err(AuthError::Validation(_))
    ));
    assert!(matches!(
        service.login(login_req("", "pw")).await,
        Err(AuthError::Validation(_))
    ));
}

#[tokio::test]
async fn test_slow_store_maps_to_unavailable() {
    let store = Arc::new(SlowStore {
        delay: Duration::from_millis(500),
    });
    let service = build_service(store, Duration::from_millis(50));

    assert_eq!(
        service.signup(signup_req("a@b.com", "pw")).await.unwrap_err(),
        AuthError::StoreUnavailable
    );
    assert_eq!(
        service.login(login_req("a@b.com", "pw")).await.unwrap_err(),
        AuthError::StoreUnavailable
    );
    assert_eq!(service.store_ready().await.unwrap_err(), AuthError::StoreUnavailable);
}

#[tokio::test]
async fn test_broken_store_maps_to_unavailable() {
    let service = build_service(Arc::new(BrokenStore), Duration::from_secs(2));

    assert_eq!(
        service.signup(signup_req("a@b.com", "pw")).await.unwrap_err(),
        AuthError::StoreUnavailable
    );
    // 存储故障不能被伪装成凭据错误
    assert_eq!(
        service.login(login_req("a@b.com", "pw")).await.unwrap_err(),
        AuthError::StoreUnavailable
    );
}

#[tokio::test]
async fn test_authenticate_rejects_bad_tokens() {
    let store = Arc::new(InMemoryCredentialStore::new());
    let service = build_service(store, Duration::from_secs(2));

    assert_eq!(
        service.authenticate("garbage").await.unwrap_err(),
        AuthError::InvalidCredentials
    );

    // 签名有效但身份不存在
    let jwt = JwtService::from_secret(SECRET).unwrap();
    let orphan = jwt.issue(&Uuid::new_v4(), chrono::Duration::minutes(5)).unwrap();
    assert_eq!(
        service.authenticate(&orphan.token).await.unwrap_err(),
        AuthError::InvalidCredentials
    );
}
