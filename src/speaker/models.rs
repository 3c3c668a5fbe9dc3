use serde::{Deserialize, Serialize};

/// Label shown for speakers that post without a stable id.
pub const ANONYMOUS_NAME: &str = "184";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    pub id: i64,
    pub name: String,
    pub registered: bool,
}

impl Speaker {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            registered: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            id: 0,
            name: ANONYMOUS_NAME.to_string(),
            registered: false,
        }
    }
}
