//! Model Context Protocol resource providers
//!
//! Exposes host scene snapshots as file-like resources under `scene://` URIs.

use chrono::{SecondsFormat, Utc};
use rust_mcp_sdk::schema::{
    ReadResourceContent, ReadResourceResult, Resource, TextResourceContents,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::scene::SceneHandle;

pub const HIERARCHY_RESOURCE_URI: &str = "scene://hierarchy";
pub const STATS_RESOURCE_URI: &str = "scene://stats";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),
}

/// Host-side collaborator behind `resources/list` and `resources/read`.
pub trait ResourceProvider: Send + Sync {
    fn list_resources(&self) -> Vec<Resource>;
    fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ResourceError>;
}

pub struct SceneResources {
    scene: SceneHandle,
}

impl SceneResources {
    pub fn new(scene: SceneHandle) -> Self {
        Self { scene }
    }
}

fn json_resource(uri: &str, name: &str, description: &str) -> Resource {
    Resource {
        annotations: None,
        description: Some(description.to_string()),
        icons: vec![],
        meta: None,
        mime_type: Some("application/json".to_string()),
        name: name.to_string(),
        size: None,
        title: None,
        uri: uri.to_string(),
    }
}

fn json_contents(uri: &str, text: String) -> ReadResourceResult {
    ReadResourceResult {
        contents: vec![ReadResourceContent::from(TextResourceContents {
            meta: None,
            mime_type: Some("application/json".to_string()),
            text,
            uri: uri.to_string(),
        })],
        meta: None,
    }
}

impl ResourceProvider for SceneResources {
    fn list_resources(&self) -> Vec<Resource> {
        vec![
            json_resource(
                HIERARCHY_RESOURCE_URI,
                "Scene Hierarchy",
                "Every object in the scene with its parent link",
            ),
            json_resource(
                STATS_RESOURCE_URI,
                "Scene Statistics",
                "Current frame and object counts",
            ),
        ]
    }

    fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ResourceError> {
        let scene = self.scene.lock();
        let generated_at_utc = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let text = match uri {
            HIERARCHY_RESOURCE_URI => {
                let objects: Vec<_> = scene.objects().collect();
                json!({ "objects": objects, "generated_at_utc": generated_at_utc })
            }
            STATS_RESOURCE_URI => {
                let active = scene.objects().filter(|object| object.active).count();
                json!({
                    "frame": scene.frame(),
                    "objects": scene.len(),
                    "active_objects": active,
                    "generated_at_utc": generated_at_utc,
                })
            }
            _ => return Err(ResourceError::NotFound(uri.to_string())),
        };

        Ok(json_contents(uri, text.to_string()))
    }
}
