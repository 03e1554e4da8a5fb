use crate::client::ApiClient;
use crate::errors::{ClientError, LoginError};
use crate::record_cache::RecordCache;
use crate::session::{LoginStatus, SessionStore};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const RESEND_COOLDOWN: Duration = Duration::from_secs(60);

/// Backend rate-limit copy, e.g. "发送过于频繁，请45秒后再试".
static RETRY_AFTER_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"请(\d+)秒后再试").expect("valid retry hint pattern"));

/// Mainland mobile number: 11 digits, `1` then 3-9.
pub fn is_valid_phone(phone: &str) -> bool {
    let bytes = phone.as_bytes();
    bytes.len() == 11
        && bytes.iter().all(u8::is_ascii_digit)
        && bytes[0] == b'1'
        && (b'3'..=b'9').contains(&bytes[1])
}

pub fn is_valid_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Seconds the backend asks us to wait, when it says so and the value is
/// plausible.
pub fn retry_after_hint(message: &str) -> Option<u64> {
    let seconds: u64 = RETRY_AFTER_HINT.captures(message)?.get(1)?.as_str().parse().ok()?;
    (1..120).contains(&seconds).then_some(seconds)
}

/// Client-side resend countdown. Not authoritative; the backend enforces
/// its own limit.
#[derive(Debug, Clone, Default)]
pub struct ResendCooldown {
    ready_at: Option<Instant>,
}

impl ResendCooldown {
    pub fn start_at(&mut self, now: Instant, length: Duration) {
        self.ready_at = Some(now + length);
    }

    /// Whole seconds left, rounded up.
    pub fn remaining_secs_at(&self, now: Instant) -> u64 {
        match self.ready_at {
            Some(ready_at) if ready_at > now => {
                let left = ready_at - now;
                left.as_secs() + u64::from(left.subsec_nanos() > 0)
            }
            _ => 0,
        }
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs_at(Instant::now())
    }
}

/// Phone + SMS code login.
pub struct LoginFlow {
    client: ApiClient,
    session: Arc<SessionStore>,
    records: RecordCache,
    cooldown: ResendCooldown,
}

impl LoginFlow {
    pub fn new(client: ApiClient, records: RecordCache) -> Self {
        let session = Arc::clone(client.session());
        Self {
            client,
            session,
            records,
            cooldown: ResendCooldown::default(),
        }
    }

    pub fn cooldown(&self) -> &ResendCooldown {
        &self.cooldown
    }

    pub async fn send_code(&mut self, phone: &str) -> Result<String, LoginError> {
        if !is_valid_phone(phone) {
            return Err(LoginError::InvalidPhone);
        }

        let remaining_secs = self.cooldown.remaining_secs();
        if remaining_secs > 0 {
            return Err(LoginError::CoolingDown { remaining_secs });
        }

        match self.client.send_verification_code(phone).await {
            Ok(message) => {
                self.cooldown.start_at(Instant::now(), RESEND_COOLDOWN);
                info!("verification code sent");
                Ok(message)
            }
            Err(ClientError::Api(message)) => {
                if let Some(seconds) = retry_after_hint(&message) {
                    warn!(seconds, "backend rate limited code request");
                    self.cooldown
                        .start_at(Instant::now(), Duration::from_secs(seconds));
                }
                Err(ClientError::Api(message).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Logs in and persists the session. Switching to another account
    /// drops every cached daily mark.
    pub async fn login(&self, phone: &str, code: &str) -> Result<LoginStatus, LoginError> {
        if !is_valid_phone(phone) {
            return Err(LoginError::InvalidPhone);
        }
        if !is_valid_code(code) {
            return Err(LoginError::InvalidCode);
        }

        let login = self.client.login(phone, code).await?;

        let previous_user = self.session.snapshot().await.user_id;
        if previous_user.is_some_and(|previous| previous != login.user_id) {
            info!(user_id = login.user_id, "account switched, clearing daily marks");
            self.records.clear_all().await?;
        }

        self.session
            .save(
                login.user_id,
                phone,
                &login.access_token,
                &login.refresh_token,
                login.expire_time,
            )
            .await?;
        Ok(self.session.status())
    }

    pub async fn logout(&self) -> Result<(), LoginError> {
        self.session.logout().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_validation() {
        assert!(is_valid_phone("13800000000"));
        assert!(is_valid_phone("19912345678"));
        assert!(!is_valid_phone("12800000000"));
        assert!(!is_valid_phone("23800000000"));
        assert!(!is_valid_phone("1380000000"));
        assert!(!is_valid_phone("138000000000"));
        assert!(!is_valid_phone("1380000000a"));
        assert!(!is_valid_phone(""));
    }

    #[test]
    fn code_validation() {
        assert!(is_valid_code("111111"));
        assert!(!is_valid_code("11111"));
        assert!(!is_valid_code("11111a"));
        assert!(!is_valid_code("１１１１１１"));
    }

    #[test]
    fn retry_hint_extraction() {
        assert_eq!(retry_after_hint("发送过于频繁，请45秒后再试"), Some(45));
        assert_eq!(retry_after_hint("请0秒后再试"), None);
        assert_eq!(retry_after_hint("请120秒后再试"), None);
        assert_eq!(retry_after_hint("验证码错误"), None);
    }

    #[test]
    fn cooldown_rounds_up_and_expires() {
        let start = Instant::now();
        let mut cooldown = ResendCooldown::default();
        assert_eq!(cooldown.remaining_secs_at(start), 0);

        cooldown.start_at(start, RESEND_COOLDOWN);
        assert_eq!(cooldown.remaining_secs_at(start), 60);
        assert_eq!(cooldown.remaining_secs_at(start + Duration::from_millis(500)), 60);
        assert_eq!(cooldown.remaining_secs_at(start + Duration::from_secs(59)), 1);
        assert_eq!(cooldown.remaining_secs_at(start + RESEND_COOLDOWN), 0);
    }
}
