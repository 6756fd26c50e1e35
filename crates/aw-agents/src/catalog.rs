use std::{fs, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;
use crate::task::{
    CaptureParams, CheckType, InfoParams, InstallParams, MaintenanceParams, NavigationParams,
    RemovalParams, TaskKind,
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawTemplate")]
pub struct TaskTemplate {
    pub name: String,
    pub description: String,
    pub expected_outcome: String,
    #[serde(flatten)]
    pub kind: TaskKind,
}

#[derive(Deserialize)]
struct RawTemplate {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    expected_outcome: String,
}

impl TryFrom<RawTemplate> for TaskTemplate {
    type Error = AgentError;

    fn try_from(raw: RawTemplate) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: TaskKind::from_parts(&raw.type_name, raw.parameters)?,
            name: raw.name,
            description: raw.description,
            expected_outcome: raw.expected_outcome,
        })
    }
}

pub type Catalog = Arc<[TaskTemplate]>;

fn template(name: &str, description: &str, kind: TaskKind, expected_outcome: &str) -> TaskTemplate {
    TaskTemplate {
        name: name.into(),
        description: description.into(),
        expected_outcome: expected_outcome.into(),
        kind,
    }
}

fn some(value: &str) -> Option<String> {
    Some(value.to_string())
}

/// The eight built-in device tasks.
pub fn default_catalog() -> Catalog {
    vec![
        template(
            "Open App",
            "Open a specific application on the device",
            TaskKind::Navigation(NavigationParams {
                package_name: some("com.android.settings"),
                activity_name: some("com.android.settings.Settings"),
                ..Default::default()
            }),
            "Settings app should open successfully",
        ),
        template(
            "Navigate to Settings",
            "Navigate to device settings menu",
            TaskKind::Navigation(NavigationParams {
                target_menu: some("Settings"),
                submenu: some("System"),
                ..Default::default()
            }),
            "Should reach System settings menu",
        ),
        template(
            "Check WiFi Status",
            "Check the current WiFi connection status",
            TaskKind::InformationGathering(InfoParams {
                check_type: CheckType::Other("connection_status".into()),
                timeout: Some(10),
                include_charging: None,
            }),
            "Should return WiFi connection information",
        ),
        template(
            "Install App",
            "Install an application from APK file",
            TaskKind::Installation(InstallParams {
                apk_path: some("/sdcard/test_app.apk"),
                package_name: some("com.example.testapp"),
            }),
            "App should install successfully",
        ),
        template(
            "Uninstall App",
            "Uninstall a specific application",
            TaskKind::Removal(RemovalParams {
                package_name: some("com.example.testapp"),
            }),
            "App should be removed from device",
        ),
        template(
            "Take Screenshot",
            "Capture a screenshot of the current screen",
            TaskKind::Capture(CaptureParams {
                output_path: some("/sdcard/screenshot.png"),
                format: some("PNG"),
            }),
            "Screenshot should be saved successfully",
        ),
        template(
            "Check Battery Level",
            "Get current battery level and status",
            TaskKind::InformationGathering(InfoParams {
                check_type: CheckType::BatteryInfo,
                timeout: None,
                include_charging: Some(true),
            }),
            "Should return battery percentage and charging status",
        ),
        template(
            "Clear App Data",
            "Clear data for a specific application",
            TaskKind::Maintenance(MaintenanceParams {
                package_name: some("com.android.settings"),
                data_types: vec!["cache".into(), "user_data".into()],
            }),
            "App data should be cleared successfully",
        ),
    ]
    .into()
}

/// Reads a JSON array of templates. An empty array is rejected.
pub fn load_catalog(path: &Path) -> Result<Catalog, AgentError> {
    let data = fs::read_to_string(path).map_err(|source| AgentError::CatalogIo {
        path: path.to_path_buf(),
        source,
    })?;
    let templates: Vec<TaskTemplate> =
        serde_json::from_str(&data).map_err(|source| AgentError::CatalogFormat {
            path: path.to_path_buf(),
            source,
        })?;
    if templates.is_empty() {
        return Err(AgentError::EmptyCatalog);
    }
    Ok(templates.into())
}
