use serde_json::{json, Value};

use super::{behaviors, compilation, nodes, transform, types, wiring, Category, Handler, JsonMap};
use crate::error::{BridgeError, BridgeResult};

/// JSON shape a required payload key must have.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    String,
    Bool,
    Number,
    Object,
    Array,
    Any,
}

impl Shape {
    pub fn as_str(self) -> &'static str {
        match self {
            Shape::String => "string",
            Shape::Bool => "bool",
            Shape::Number => "number",
            Shape::Object => "object",
            Shape::Array => "array",
            Shape::Any => "any",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Shape::String => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            Shape::Bool => value.is_boolean(),
            Shape::Number => value.is_number(),
            Shape::Object => value.is_object(),
            Shape::Array => value.is_array(),
            Shape::Any => true,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ArgSpec {
    pub name: &'static str,
    pub shape: Shape,
}

const fn arg(name: &'static str, shape: Shape) -> ArgSpec {
    ArgSpec { name, shape }
}

const PATH: ArgSpec = arg("path", Shape::String);
const BEHAVIOR: ArgSpec = arg("behaviorType", Shape::String);
const EVENT: ArgSpec = arg("eventName", Shape::String);

pub struct ToolSpec {
    pub tool_name: &'static str,
    pub category: Category,
    pub operation: &'static str,
    pub mutating: bool,
    pub required: &'static [ArgSpec],
    pub summary: &'static str,
    pub handler: Handler,
}

impl ToolSpec {
    pub fn validate(&self, payload: &JsonMap) -> BridgeResult<()> {
        for spec in self.required {
            match payload.get(spec.name) {
                None => {
                    return Err(BridgeError::missing(format!(
                        "{} requires '{}'",
                        self.tool_name, spec.name
                    )))
                }
                Some(Value::Null) if spec.shape != Shape::Any => {
                    return Err(BridgeError::missing(format!(
                        "{} requires '{}'",
                        self.tool_name, spec.name
                    )))
                }
                Some(value) if !spec.shape.accepts(value) => {
                    return Err(BridgeError::missing(format!(
                        "{}: '{}' must be a non-empty {}",
                        self.tool_name,
                        spec.name,
                        spec.shape.as_str()
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        let required: Vec<Value> = self
            .required
            .iter()
            .map(|a| json!({ "name": a.name, "shape": a.shape.as_str() }))
            .collect();
        json!({
            "toolName": self.tool_name,
            "category": self.category.slug(),
            "operation": self.operation,
            "mutating": self.mutating,
            "required": required,
            "summary": self.summary,
        })
    }
}

static TOOLS: &[ToolSpec] = &[
    ToolSpec {
        tool_name: "find_node",
        category: Category::Node,
        operation: "find",
        mutating: false,
        required: &[PATH],
        summary: "Resolve a node path and describe the node",
        handler: nodes::find,
    },
    ToolSpec {
        tool_name: "find_nodes",
        category: Category::Node,
        operation: "find_all",
        mutating: false,
        required: &[arg("pattern", Shape::String)],
        summary: "Glob search over node names or anchored paths",
        handler: nodes::find_all,
    },
    ToolSpec {
        tool_name: "get_hierarchy",
        category: Category::Node,
        operation: "hierarchy",
        mutating: false,
        required: &[],
        summary: "Nested node tree below a path, or every root",
        handler: nodes::hierarchy,
    },
    ToolSpec {
        tool_name: "create_node",
        category: Category::Node,
        operation: "create",
        mutating: true,
        required: &[arg("name", Shape::String)],
        summary: "Spawn a named node, optionally under a parent with behaviors",
        handler: nodes::create,
    },
    ToolSpec {
        tool_name: "delete_node",
        category: Category::Node,
        operation: "delete",
        mutating: true,
        required: &[PATH],
        summary: "Despawn a node and its descendants",
        handler: nodes::delete,
    },
    ToolSpec {
        tool_name: "rename_node",
        category: Category::Node,
        operation: "rename",
        mutating: true,
        required: &[PATH, arg("newName", Shape::String)],
        summary: "Rename a node",
        handler: nodes::rename,
    },
    ToolSpec {
        tool_name: "reparent_node",
        category: Category::Node,
        operation: "reparent",
        mutating: true,
        required: &[PATH],
        summary: "Move a node under a new parent, or to the root when omitted",
        handler: nodes::reparent,
    },
    ToolSpec {
        tool_name: "set_node_active",
        category: Category::Node,
        operation: "set_active",
        mutating: true,
        required: &[PATH, arg("active", Shape::Bool)],
        summary: "Toggle a node's active flag",
        handler: nodes::set_active,
    },
    ToolSpec {
        tool_name: "list_behaviors",
        category: Category::Behavior,
        operation: "list",
        mutating: false,
        required: &[PATH],
        summary: "Behaviors attached to a node",
        handler: behaviors::list,
    },
    ToolSpec {
        tool_name: "get_behavior",
        category: Category::Behavior,
        operation: "get",
        mutating: false,
        required: &[PATH, BEHAVIOR],
        summary: "Read a behavior, or one member of it",
        handler: behaviors::get,
    },
    ToolSpec {
        tool_name: "attach_behavior",
        category: Category::Behavior,
        operation: "attach",
        mutating: true,
        required: &[PATH, BEHAVIOR],
        summary: "Attach a behavior built from its default plus properties",
        handler: behaviors::attach,
    },
    ToolSpec {
        tool_name: "detach_behavior",
        category: Category::Behavior,
        operation: "detach",
        mutating: true,
        required: &[PATH, BEHAVIOR],
        summary: "Remove a behavior from a node",
        handler: behaviors::detach,
    },
    ToolSpec {
        tool_name: "set_behavior_property",
        category: Category::Behavior,
        operation: "set_property",
        mutating: true,
        required: &[PATH, BEHAVIOR, arg("property", Shape::String), arg("value", Shape::Any)],
        summary: "Coerce a value onto one behavior member",
        handler: behaviors::set_property,
    },
    ToolSpec {
        tool_name: "set_behavior_properties",
        category: Category::Behavior,
        operation: "set_properties",
        mutating: true,
        required: &[PATH, BEHAVIOR, arg("properties", Shape::Object)],
        summary: "Apply several member edits atomically",
        handler: behaviors::set_properties,
    },
    ToolSpec {
        tool_name: "get_transform",
        category: Category::Transform,
        operation: "get",
        mutating: false,
        required: &[PATH],
        summary: "Local and global transform of a node",
        handler: transform::get,
    },
    ToolSpec {
        tool_name: "set_transform",
        category: Category::Transform,
        operation: "set",
        mutating: true,
        required: &[PATH],
        summary: "Overwrite translation, rotation or scale",
        handler: transform::set,
    },
    ToolSpec {
        tool_name: "adjust_transform",
        category: Category::Transform,
        operation: "adjust",
        mutating: true,
        required: &[PATH],
        summary: "Translate, rotate or scale relative to the current transform",
        handler: transform::adjust,
    },
    ToolSpec {
        tool_name: "resolve_type",
        category: Category::Types,
        operation: "resolve",
        mutating: false,
        required: &[arg("typeName", Shape::String)],
        summary: "Resolve a type name and report the tier that matched",
        handler: types::resolve,
    },
    ToolSpec {
        tool_name: "describe_type",
        category: Category::Types,
        operation: "describe",
        mutating: false,
        required: &[arg("typeName", Shape::String)],
        summary: "Members, variants, events and methods of a type",
        handler: types::describe,
    },
    ToolSpec {
        tool_name: "list_behavior_types",
        category: Category::Types,
        operation: "list",
        mutating: false,
        required: &[],
        summary: "Registered behavior types, optionally glob filtered",
        handler: types::list,
    },
    ToolSpec {
        tool_name: "list_event_fields",
        category: Category::Event,
        operation: "fields",
        mutating: false,
        required: &[PATH, BEHAVIOR],
        summary: "Observer event fields of a behavior",
        handler: wiring::fields,
    },
    ToolSpec {
        tool_name: "list_event_listeners",
        category: Category::Event,
        operation: "list",
        mutating: false,
        required: &[PATH, BEHAVIOR, EVENT],
        summary: "Persistent listeners of one event",
        handler: wiring::list,
    },
    ToolSpec {
        tool_name: "wire_event",
        category: Category::Event,
        operation: "wire",
        mutating: true,
        required: &[
            PATH,
            BEHAVIOR,
            EVENT,
            arg("targetPath", Shape::String),
            arg("methodName", Shape::String),
        ],
        summary: "Add a persistent listener from an event to a target method",
        handler: wiring::wire,
    },
    ToolSpec {
        tool_name: "unwire_event",
        category: Category::Event,
        operation: "unwire",
        mutating: true,
        required: &[PATH, BEHAVIOR, EVENT],
        summary: "Remove listeners by index or by target and method",
        handler: wiring::unwire,
    },
    ToolSpec {
        tool_name: "invoke_event",
        category: Category::Event,
        operation: "invoke",
        mutating: true,
        required: &[PATH, BEHAVIOR, EVENT],
        summary: "Call every enabled listener of an event",
        handler: wiring::invoke,
    },
    ToolSpec {
        tool_name: "batch_execute",
        category: Category::Batch,
        operation: "execute",
        mutating: false,
        required: &[arg("items", Shape::Array)],
        summary: "Run several commands in order with per-item results",
        handler: crate::batch::handle,
    },
    ToolSpec {
        tool_name: "get_compilation_status",
        category: Category::Compilation,
        operation: "status",
        mutating: false,
        required: &[],
        summary: "Whether the host is rebuilding",
        handler: compilation::status,
    },
    ToolSpec {
        tool_name: "wait_for_compilation",
        category: Category::Compilation,
        operation: "wait",
        mutating: false,
        required: &[],
        summary: "Block until the host stops rebuilding or the wait elapses",
        handler: compilation::wait,
    },
];

pub fn tools() -> &'static [ToolSpec] {
    TOOLS
}

pub fn tool_by_name(tool_name: &str) -> Option<&'static ToolSpec> {
    let name = tool_name.trim();
    TOOLS.iter().find(|t| t.tool_name == name)
}

pub fn tool_for(category: &str, operation: &str) -> Option<&'static ToolSpec> {
    let category = Category::parse(category)?;
    let operation = operation.trim();
    TOOLS
        .iter()
        .find(|t| t.category == category && t.operation.eq_ignore_ascii_case(operation))
}
