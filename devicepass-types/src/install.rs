//! Installation proof returned by the hosting platform.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::wire::ShapeError;

/// Owner and repository the device is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRepo {
    pub owner: String,
    pub repo: String,
}

/// The platform app the operator is asked to install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    pub client_id: String,
}

/// Installation payload as the platform reports it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInstallation {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub permissions: Option<Value>,
}

/// Accepted installation: a numeric id and a permissions object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallationRecord {
    pub git: GitRepo,
    pub app: AppIdentity,
    pub id: u64,
    pub permissions: Map<String, Value>,
}

impl InstallationRecord {
    pub fn from_raw(git: GitRepo, app: AppIdentity, raw: &RawInstallation) -> Result<Self, ShapeError> {
        let id = raw
            .id
            .as_ref()
            .and_then(Value::as_u64)
            .ok_or(ShapeError { shape: "installation", field: "id" })?;
        let permissions = raw
            .permissions
            .as_ref()
            .and_then(Value::as_object)
            .cloned()
            .ok_or(ShapeError { shape: "installation", field: "permissions" })?;
        Ok(Self { git, app, id, permissions })
    }
}
