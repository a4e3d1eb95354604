use serde::{Deserialize, Serialize};

// Body returned to callers when the admission policy rejects them
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RefusalBody {
    pub code: i32,
    pub cn_msg: String,
    pub en_msg: String,
}

impl RefusalBody {
    pub fn new(remaining_seconds: i64) -> Self {
        Self {
            code: 0,
            cn_msg: format!("目前下载的人数太多，请稍等{remaining_seconds}秒后再试"),
            en_msg: format!(
                "Currently, there are too many people downloading. Please wait for {remaining_seconds} seconds and try again."
            ),
        }
    }
}

// Text message format accepted by the alert webhook
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AlertPayload {
    pub msgtype: String,
    pub text: AlertText,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct AlertText {
    pub content: String,
}

impl AlertPayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            msgtype: "text".to_string(),
            text: AlertText {
                content: content.into(),
            },
        }
    }
}
