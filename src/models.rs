use serde::{Deserialize, Serialize};

/// Answer to "did you gain weight today". Serialized as the backend's
/// integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum WeightOption {
    Gained,
    NotGained,
}

impl WeightOption {
    pub fn code(self) -> u8 {
        match self {
            WeightOption::Gained => 1,
            WeightOption::NotGained => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(WeightOption::Gained),
            2 => Some(WeightOption::NotGained),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WeightOption::Gained => "gained",
            WeightOption::NotGained => "not gained",
        }
    }
}

impl From<WeightOption> for u8 {
    fn from(option: WeightOption) -> Self {
        option.code()
    }
}

impl TryFrom<u8> for WeightOption {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        WeightOption::from_code(i64::from(code)).ok_or_else(|| format!("unknown weight type {code}"))
    }
}

/// Standard response envelope of every backend endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: Option<i64>,
    pub msg: Option<String>,
    pub data: Option<T>,
    pub success: Option<bool>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: Some(200),
            msg: Some("success".to_string()),
            data: Some(data),
            success: Some(true),
        }
    }

    pub fn empty() -> Self {
        Self {
            code: Some(200),
            msg: Some("success".to_string()),
            data: None,
            success: Some(true),
        }
    }

    pub fn fail(code: i64, msg: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            msg: Some(msg.into()),
            data: None,
            success: Some(false),
        }
    }

    /// `success` wins when present; otherwise code 0 or 200 means success.
    pub fn is_success(&self) -> bool {
        match self.success {
            Some(success) => success,
            None => matches!(self.code, Some(0) | Some(200)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendCodeRequest {
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    /// Ignored by the backend, which reads the user from the bearer token.
    pub user_id: i64,
    pub weight_type: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch milliseconds.
    pub expire_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayRecord {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub weight_type: Option<i64>,
    pub record_date: Option<String>,
    pub create_time: Option<String>,
}

impl TodayRecord {
    /// Any code other than 1 reads as not gained, the same way the backend
    /// renders it.
    pub fn option(&self) -> Option<WeightOption> {
        self.weight_type.map(|code| match code {
            1 => WeightOption::Gained,
            _ => WeightOption::NotGained,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecordMark {
    pub date: String,
    pub option: WeightOption,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_success_prefers_flag_over_code() {
        let envelope: ApiEnvelope<String> =
            serde_json::from_str(r#"{"code":200,"msg":"nope","success":false}"#).unwrap();
        assert!(!envelope.is_success());

        let envelope: ApiEnvelope<String> =
            serde_json::from_str(r#"{"code":500,"success":true,"data":"ok"}"#).unwrap();
        assert!(envelope.is_success());
    }

    #[test]
    fn envelope_success_falls_back_to_code() {
        for (body, expected) in [
            (r#"{"code":0}"#, true),
            (r#"{"code":200}"#, true),
            (r#"{"code":400,"msg":"bad"}"#, false),
            (r#"{}"#, false),
        ] {
            let envelope: ApiEnvelope<i64> = serde_json::from_str(body).unwrap();
            assert_eq!(envelope.is_success(), expected, "{body}");
        }
    }

    #[test]
    fn weight_option_uses_backend_codes() {
        assert_eq!(serde_json::to_string(&WeightOption::Gained).unwrap(), "1");
        assert_eq!(serde_json::to_string(&WeightOption::NotGained).unwrap(), "2");
        assert!(serde_json::from_str::<WeightOption>("3").is_err());
    }

    #[test]
    fn login_response_reads_camel_case() {
        let response: LoginResponse = serde_json::from_str(
            r#"{"userId":7,"accessToken":"a","refreshToken":"r","expireTime":1700000000000}"#,
        )
        .unwrap();
        assert_eq!(response.user_id, 7);
        assert_eq!(response.expire_time, 1_700_000_000_000);
    }

    #[test]
    fn today_record_maps_unknown_codes_to_not_gained() {
        let record = TodayRecord {
            weight_type: Some(9),
            ..TodayRecord::default()
        };
        assert_eq!(record.option(), Some(WeightOption::NotGained));
        assert_eq!(TodayRecord::default().option(), None);
    }
}
