//! Host tools exposed via Model Context Protocol
//!
//! Provides the scene object tools and a stateless host information tool.
//! Failures that concern the scene itself (unknown object, bad parent) are
//! returned as `{"error": ...}` payloads; only malformed arguments fail the
//! invocation.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domain::scene::{NewObject, ObjectId, SceneHandle, Vector3, OBJECT_KINDS};
use crate::http::sse::NotificationHub;
use crate::mcp::registry::{parse_arguments, ToolError, ToolProvider, ToolRegistrar};
use crate::mcp::schema::{FieldKind, FieldSchema, ToolArguments};

pub const SCENE_CHANGED_NOTIFICATION: &str = "notifications/scene_changed";

#[derive(Debug, Deserialize)]
pub struct CreateObjectArgs {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub parent: Option<ObjectId>,
    #[serde(default)]
    pub position: Vector3,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_kind() -> String {
    "empty".to_string()
}

impl ToolArguments for CreateObjectArgs {
    fn fields() -> Vec<FieldSchema> {
        vec![
            FieldSchema::new("name", FieldKind::String)
                .description("Name of the new object")
                .required(),
            FieldSchema::new("kind", FieldKind::String)
                .description("Primitive to create")
                .one_of(&OBJECT_KINDS),
            FieldSchema::new("parent", FieldKind::Integer).description("Id of the parent object"),
            FieldSchema::new(
                "position",
                FieldKind::Object(vec![
                    FieldSchema::new("x", FieldKind::Number),
                    FieldSchema::new("y", FieldKind::Number),
                    FieldSchema::new("z", FieldKind::Number),
                ]),
            )
            .description("World position"),
            FieldSchema::new("tags", FieldKind::array_of(FieldKind::String)),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct FindObjectArgs {
    pub name: String,
}

impl ToolArguments for FindObjectArgs {
    fn fields() -> Vec<FieldSchema> {
        vec![FieldSchema::new("name", FieldKind::String)
            .description("Exact object name")
            .required()]
    }
}

#[derive(Debug, Deserialize)]
pub struct ListObjectsArgs {
    pub tag: Option<String>,
}

impl ToolArguments for ListObjectsArgs {
    fn fields() -> Vec<FieldSchema> {
        vec![FieldSchema::new("tag", FieldKind::String).description("Only objects with this tag")]
    }
}

#[derive(Debug, Deserialize)]
pub struct SetActiveArgs {
    pub id: ObjectId,
    pub active: bool,
}

impl ToolArguments for SetActiveArgs {
    fn fields() -> Vec<FieldSchema> {
        vec![
            FieldSchema::new("id", FieldKind::Integer).required(),
            FieldSchema::new("active", FieldKind::Boolean).required(),
        ]
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteObjectArgs {
    pub id: ObjectId,
}

impl ToolArguments for DeleteObjectArgs {
    fn fields() -> Vec<FieldSchema> {
        vec![FieldSchema::new("id", FieldKind::Integer)
            .description("Object to delete together with its children")
            .required()]
    }
}

pub struct SceneTools {
    scene: SceneHandle,
    notifications: Arc<NotificationHub>,
}

impl SceneTools {
    pub fn new(scene: SceneHandle, notifications: Arc<NotificationHub>) -> Self {
        Self {
            scene,
            notifications,
        }
    }

    pub fn create_object(&self, arguments: &str) -> Result<Value, ToolError> {
        let args: CreateObjectArgs = parse_arguments(arguments)?;
        if args.name.trim().is_empty() {
            return Err(ToolError::InvalidArguments("name must not be empty".to_string()));
        }

        let mut scene = self.scene.lock();
        let created = scene.create(NewObject {
            name: args.name,
            kind: args.kind,
            parent: args.parent,
            position: args.position,
            tags: args.tags,
        });
        let (id, object) = match created {
            Ok(object) => (object.id, json!(object)),
            Err(message) => return Ok(json!({ "error": message })),
        };
        let objects = scene.len();
        drop(scene);

        self.scene_changed("created", &[id], objects);
        Ok(object)
    }

    pub fn find_object(&self, arguments: &str) -> Result<Value, ToolError> {
        let args: FindObjectArgs = parse_arguments(arguments)?;
        let scene = self.scene.lock();

        Ok(match scene.find_by_name(&args.name) {
            Some(object) => json!(object),
            None => json!({ "error": format!("Object not found: {}", args.name) }),
        })
    }

    pub fn list_objects(&self, arguments: &str) -> Result<Value, ToolError> {
        let args: ListObjectsArgs = parse_arguments(arguments)?;
        let scene = self.scene.lock();

        let objects: Vec<_> = scene
            .objects()
            .filter(|object| match args.tag.as_deref() {
                Some(tag) => object.tags.iter().any(|candidate| candidate == tag),
                None => true,
            })
            .collect();

        Ok(json!({
            "objects": objects,
            "count": objects.len(),
            "frame": scene.frame(),
        }))
    }

    pub fn set_active(&self, arguments: &str) -> Result<Value, ToolError> {
        let args: SetActiveArgs = parse_arguments(arguments)?;
        let mut scene = self.scene.lock();

        Ok(match scene.set_active(args.id, args.active) {
            Some(object) => json!(object),
            None => json!({ "error": format!("Object not found: {}", args.id) }),
        })
    }

    pub fn delete_object(&self, arguments: &str) -> Result<Value, ToolError> {
        let args: DeleteObjectArgs = parse_arguments(arguments)?;
        let mut scene = self.scene.lock();

        let Some(removed) = scene.delete(args.id) else {
            return Ok(json!({ "error": format!("Object not found: {}", args.id) }));
        };
        let objects = scene.len();
        drop(scene);

        self.scene_changed("deleted", &removed, objects);
        Ok(Value::Null)
    }

    fn scene_changed(&self, change: &str, ids: &[ObjectId], objects: usize) {
        self.notifications.notify(
            SCENE_CHANGED_NOTIFICATION,
            &json!({ "change": change, "ids": ids, "objects": objects }),
        );
    }
}

impl ToolProvider for SceneTools {
    fn register_tools(self: Arc<Self>, registrar: &mut ToolRegistrar) {
        let tools = Arc::clone(&self);
        registrar.tool::<CreateObjectArgs, _>(
            "create_object",
            "Create a scene object",
            move |arguments| tools.create_object(arguments),
        );

        let tools = Arc::clone(&self);
        registrar.tool::<FindObjectArgs, _>(
            "find_object",
            "Find a scene object by name",
            move |arguments| tools.find_object(arguments),
        );

        let tools = Arc::clone(&self);
        registrar.tool::<ListObjectsArgs, _>(
            "list_objects",
            "List scene objects, optionally filtered by tag",
            move |arguments| tools.list_objects(arguments),
        );

        let tools = Arc::clone(&self);
        registrar.tool::<SetActiveArgs, _>(
            "set_active",
            "Activate or deactivate a scene object",
            move |arguments| tools.set_active(arguments),
        );

        registrar.tool::<DeleteObjectArgs, _>(
            "delete_object",
            "Delete a scene object and its children",
            move |arguments| self.delete_object(arguments),
        );
    }
}

/// Tools that need no owning state.
pub struct HostInfoTools;

impl ToolProvider for HostInfoTools {
    fn register_tools(self: Arc<Self>, registrar: &mut ToolRegistrar) {
        registrar.stateless("get_host_info", "Describe the host process", || {
            Ok(json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "time_utc": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            }))
        });
    }
}
