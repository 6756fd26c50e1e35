use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AgentError;

pub const DEFAULT_PACKAGE: &str = "com.android.settings";
pub const DEFAULT_SCREENSHOT_PATH: &str = "/sdcard/screenshot.png";

/// A unit of device work. Immutable once handed to the executor.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    pub expected_outcome: String,
    #[serde(flatten)]
    pub kind: TaskKind,
    pub priority: u8,
    #[serde(rename = "timeout")]
    pub timeout_secs: u32,
    pub retry_count: u32,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum TaskKind {
    Navigation(NavigationParams),
    InformationGathering(InfoParams),
    Installation(InstallParams),
    Removal(RemovalParams),
    Capture(CaptureParams),
    Maintenance(MaintenanceParams),
    Generic(GenericParams),
}

impl TaskKind {
    /// Builds a kind from its wire name and a JSON parameter object.
    /// Unrecognized names are routed to the generic runner.
    pub fn from_parts(type_name: &str, parameters: Value) -> Result<Self, AgentError> {
        let parameters = match parameters {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let invalid = |source| AgentError::InvalidParameters {
            kind: type_name.to_string(),
            source,
        };
        let kind = match type_name {
            "navigation" => Self::Navigation(serde_json::from_value(parameters).map_err(invalid)?),
            "information_gathering" => {
                Self::InformationGathering(serde_json::from_value(parameters).map_err(invalid)?)
            }
            "installation" => {
                Self::Installation(serde_json::from_value(parameters).map_err(invalid)?)
            }
            "removal" => Self::Removal(serde_json::from_value(parameters).map_err(invalid)?),
            "capture" => Self::Capture(serde_json::from_value(parameters).map_err(invalid)?),
            "maintenance" => {
                Self::Maintenance(serde_json::from_value(parameters).map_err(invalid)?)
            }
            _ => Self::Generic(serde_json::from_value(parameters).map_err(invalid)?),
        };
        Ok(kind)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Navigation(_) => "navigation",
            Self::InformationGathering(_) => "information_gathering",
            Self::Installation(_) => "installation",
            Self::Removal(_) => "removal",
            Self::Capture(_) => "capture",
            Self::Maintenance(_) => "maintenance",
            Self::Generic(_) => "generic",
        }
    }

    pub fn parameters(&self) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut value| value.get_mut("parameters").map(Value::take))
            .unwrap_or(Value::Null)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NavigationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_menu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submenu: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InfoParams {
    pub check_type: CheckType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_charging: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CheckType {
    WifiStatus,
    BatteryInfo,
    Other(String),
}

impl CheckType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::WifiStatus => "wifi_status",
            Self::BatteryInfo => "battery_info",
            Self::Other(value) => value,
        }
    }
}

impl Default for CheckType {
    fn default() -> Self {
        Self::Other("general".into())
    }
}

impl From<String> for CheckType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "wifi_status" => Self::WifiStatus,
            "battery_info" => Self::BatteryInfo,
            _ => Self::Other(value),
        }
    }
}

impl From<CheckType> for String {
    fn from(value: CheckType) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstallParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apk_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemovalParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MaintenanceParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    pub data_types: Vec<String>,
}

impl Default for MaintenanceParams {
    fn default() -> Self {
        Self {
            package_name: None,
            data_types: vec!["cache".into()],
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct GenericParams(pub Map<String, Value>);

/// Returns the value when it is present and not blank.
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_parts_parses_typed_parameters() {
        let kind = TaskKind::from_parts(
            "maintenance",
            json!({"package_name": "com.example.app"}),
        )
        .unwrap();
        match kind {
            TaskKind::Maintenance(params) => {
                assert_eq!(params.package_name.as_deref(), Some("com.example.app"));
                assert_eq!(params.data_types, vec!["cache".to_string()]);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn unknown_type_routes_to_generic() {
        let kind = TaskKind::from_parts("click_button", json!({"x": 100})).unwrap();
        assert_eq!(kind.type_name(), "generic");
        assert_eq!(kind.parameters()["x"], 100);
    }

    #[test]
    fn null_parameters_use_defaults() {
        let kind = TaskKind::from_parts("capture", Value::Null).unwrap();
        assert_eq!(kind, TaskKind::Capture(CaptureParams::default()));
    }

    #[test]
    fn wrong_parameter_shape_is_rejected() {
        let err = TaskKind::from_parts("removal", json!({"package_name": 7})).unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters { ref kind, .. } if kind == "removal"));
    }

    #[test]
    fn check_type_keeps_unknown_values() {
        let kind = TaskKind::from_parts(
            "information_gathering",
            json!({"check_type": "connection_status", "timeout": 10}),
        )
        .unwrap();
        let TaskKind::InformationGathering(params) = &kind else {
            panic!("unexpected kind {kind:?}");
        };
        assert_eq!(params.check_type, CheckType::Other("connection_status".into()));
        assert_eq!(kind.parameters()["check_type"], "connection_status");
    }

    #[test]
    fn task_serializes_with_type_and_parameters() {
        let task = Task {
            id: "abc".into(),
            name: "Take Screenshot".into(),
            description: "d".into(),
            expected_outcome: "e".into(),
            kind: TaskKind::Capture(CaptureParams {
                output_path: Some("/sdcard/a.png".into()),
                format: None,
            }),
            priority: 2,
            timeout_secs: 45,
            retry_count: 0,
        };
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["type"], "capture");
        assert_eq!(value["parameters"]["output_path"], "/sdcard/a.png");
        assert_eq!(value["timeout"], 45);
        assert!(value["parameters"].get("format").is_none());
    }
}
