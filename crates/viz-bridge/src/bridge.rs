//! Line-oriented JSON dispatcher.
//!
//! Reads one JSON object per line, dispatches it synchronously, and writes
//! exactly one JSON response line per request. Single-threaded on purpose:
//! a request is fully handled and its response flushed before the next is
//! read, so e.g. a `destroy` always completes before a later `render` of
//! the same instance is attempted. stdout carries the protocol; all
//! logging goes to stderr.

use crate::error::panic_message;
use crate::registry::{Registry, SavedInstance};
use crate::shm::AudioShmReader;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{error, info, warn};
use viz_bridge_api::{
    AudioFrame, Color, Component, Font, Property, RenderCommand, RenderContext, TextAlign,
};

/// One scan result entry, including failed units.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "class")]
    pub type_name: String,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub enabled: bool,
}

/// Outbound protocol messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    ScanResult {
        count: usize,
        plugins: Vec<PluginSummary>,
    },
    ManifestList {
        manifests: Vec<Value>,
    },
    Created {
        instance_id: String,
        manifest_id: String,
        properties: Vec<Property>,
        images: BTreeMap<String, String>,
    },
    RenderCommands {
        instance_id: String,
        commands: Vec<RenderCommand>,
        has_error: bool,
    },
    SaveData {
        #[serde(rename = "data")]
        instances: BTreeMap<String, SavedInstance>,
    },
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        message: String,
    },
}

impl Response {
    fn ok() -> Self {
        Response::Ok { message: None }
    }

    fn ok_message(message: impl Into<String>) -> Self {
        Response::Ok {
            message: Some(message.into()),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

#[derive(Deserialize)]
struct CreateParams {
    manifest_id: String,
    #[serde(default)]
    instance_id: Option<String>,
}

fn default_width() -> f32 {
    300.0
}

fn default_height() -> f32 {
    200.0
}

#[derive(Deserialize)]
struct RenderParams {
    instance_id: String,
    #[serde(default = "default_width")]
    width: f32,
    #[serde(default = "default_height")]
    height: f32,
    #[serde(default)]
    audio: Value,
}

#[derive(Deserialize)]
struct SetPropertyParams {
    instance_id: String,
    key: String,
    #[serde(default)]
    value: Value,
}

#[derive(Deserialize)]
struct ResizeParams {
    instance_id: String,
    width: f32,
    height: f32,
}

#[derive(Deserialize)]
struct MouseEventParams {
    instance_id: String,
    event: String,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    button: u8,
}

#[derive(Deserialize)]
struct InstanceParams {
    instance_id: String,
}

#[derive(Deserialize)]
struct LoadParams {
    #[serde(rename = "data", default)]
    instances: BTreeMap<String, SavedInstance>,
}

#[derive(Deserialize)]
struct ReloadParams {
    manifest_id: String,
}

const ERROR_MESSAGE_LIMIT: usize = 200;

/// Command buffer substituted for a component's output when its render
/// hook fails: dark background, red border, label, diagnostic, hint.
fn error_overlay(width: f32, height: f32, message: &str) -> Vec<RenderCommand> {
    let mut ctx = RenderContext::new(width, height);
    ctx.clear(Color::rgb(0x20, 0x08, 0x08));

    let border = 3.0;
    ctx.stroke_rect(
        border / 2.0,
        border / 2.0,
        width - border,
        height - border,
        Color::rgb(0xFF, 0x33, 0x33),
        border,
    );

    let label_y = 20.0_f32.min(height * 0.1);
    ctx.draw_text(
        "ERROR",
        0.0,
        label_y,
        width,
        24.0,
        Color::rgb(0xFF, 0x44, 0x44),
        Font::new("Arial", 18.0).bold(),
        TextAlign::Center,
    );

    let truncated: String = message.chars().take(ERROR_MESSAGE_LIMIT).collect();
    let message_y = label_y + 30.0;
    ctx.draw_text(
        truncated,
        10.0,
        message_y,
        width - 20.0,
        height - message_y - 10.0,
        Color::rgb(0xFF, 0xAA, 0xAA),
        Font::new("Consolas", 11.0),
        TextAlign::Left,
    );

    if height > 100.0 {
        ctx.draw_text(
            "Fix the component and reload",
            0.0,
            height - 25.0,
            width,
            20.0,
            Color::rgb(0x99, 0x66, 0x66),
            Font::new("Arial", 10.0),
            TextAlign::Center,
        );
    }

    ctx.take_commands()
}

pub struct Bridge {
    registry: Registry,
    shm: AudioShmReader,
    shm_available: bool,
    instance_errors: HashMap<String, String>,
    running: bool,
}

impl Bridge {
    pub fn new(registry: Registry, mut shm: AudioShmReader) -> Self {
        let shm_available = shm.open();
        Self {
            registry,
            shm,
            shm_available,
            instance_errors: HashMap::new(),
            running: false,
        }
    }

    /// Last render failure recorded for an instance, cleared by the next
    /// successful render.
    pub fn last_error(&self, instance_id: &str) -> Option<&str> {
        self.instance_errors.get(instance_id).map(String::as_str)
    }

    /// Run the dispatch loop until end-of-input or a shutdown request.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) {
        self.running = true;
        for line in input.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("Input stream failed: {e}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line);
            self.send(&mut output, &response);
            if !self.running {
                break;
            }
        }
    }

    /// Handle one raw request line, producing exactly one response.
    pub fn handle_line(&mut self, line: &str) -> Response {
        let msg: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => return Response::error(format!("Invalid JSON: {e}")),
        };

        // Component hooks other than render (resize, mouse, teardown) run
        // without a dedicated overlay; this boundary keeps a panic in any
        // of them from killing the loop.
        match catch_unwind(AssertUnwindSafe(|| self.dispatch(&msg))) {
            Ok(response) => response,
            Err(payload) => Response::error(panic_message(payload)),
        }
    }

    fn dispatch(&mut self, msg: &Value) -> Response {
        let kind = msg.get("type").and_then(Value::as_str).unwrap_or("");
        match kind {
            "scan" => self.handle_scan(),
            "list" => self.handle_list(),
            "create" => self.handle_create(msg),
            "render" => self.handle_render(msg),
            "set_property" => self.handle_set_property(msg),
            "resize" => self.handle_resize(msg),
            "mouse_event" => self.handle_mouse_event(msg),
            "destroy" => self.handle_destroy(msg),
            "save" => self.handle_save(),
            "load" => self.handle_load(msg),
            "reload" => self.handle_reload(msg),
            "shutdown" => self.handle_shutdown(),
            other => Response::error(format!("Unknown message type: {other}")),
        }
    }

    fn handle_scan(&mut self) -> Response {
        self.registry.scan();
        let plugins: Vec<PluginSummary> = self
            .registry
            .records()
            .map(|record| PluginSummary {
                id: record.manifest.id.clone(),
                name: record.manifest.name.clone(),
                type_name: record.type_name.clone(),
                file: record.unit.file(),
                error: record.load_error.clone(),
                enabled: record.enabled,
            })
            .collect();
        Response::ScanResult {
            count: plugins.len(),
            plugins,
        }
    }

    fn handle_list(&mut self) -> Response {
        Response::ManifestList {
            manifests: self.registry.manifest_list(),
        }
    }

    fn handle_create(&mut self, msg: &Value) -> Response {
        let params: CreateParams = match serde_json::from_value(msg.clone()) {
            Ok(p) => p,
            Err(e) => return Response::error(e.to_string()),
        };
        let instance_id = match self.registry.create(&params.manifest_id, params.instance_id) {
            Ok(id) => id,
            Err(e) => return Response::error(e.to_string()),
        };
        let Some(instance) = self.registry.instance_mut(&instance_id) else {
            return Response::error(format!("Instance not found: {instance_id}"));
        };
        Response::Created {
            instance_id,
            manifest_id: params.manifest_id,
            properties: instance.component.properties(),
            images: instance.component.base().images().clone(),
        }
    }

    fn handle_render(&mut self, msg: &Value) -> Response {
        let params: RenderParams = match serde_json::from_value(msg.clone()) {
            Ok(p) => p,
            Err(e) => return Response::error(e.to_string()),
        };

        // Prefer the shared-memory frame; fall back to the request payload.
        let audio = if self.shm_available && self.shm.is_open() {
            match self.shm.read() {
                Some(frame) => frame,
                None => AudioFrame::from_json(&params.audio),
            }
        } else {
            AudioFrame::from_json(&params.audio)
        };

        let Some(instance) = self.registry.instance_mut(&params.instance_id) else {
            return Response::error(format!("Instance not found: {}", params.instance_id));
        };
        instance.component.base_mut().tick_frame();

        let mut ctx = RenderContext::new(params.width, params.height);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            instance.component.on_render(&mut ctx, &audio)
        }));

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => Some(panic_message(payload)),
        };

        let (commands, has_error) = match failure {
            None => {
                self.instance_errors.remove(&params.instance_id);
                (ctx.take_commands(), false)
            }
            Some(message) => {
                error!("Render failed for instance {}: {message}", params.instance_id);
                self.instance_errors
                    .insert(params.instance_id.clone(), message.clone());
                // The partial buffer is discarded with ctx.
                (error_overlay(params.width, params.height, &message), true)
            }
        };

        Response::RenderCommands {
            instance_id: params.instance_id,
            commands,
            has_error,
        }
    }

    fn handle_set_property(&mut self, msg: &Value) -> Response {
        let params: SetPropertyParams = match serde_json::from_value(msg.clone()) {
            Ok(p) => p,
            Err(e) => return Response::error(e.to_string()),
        };
        let Some(instance) = self.registry.instance_mut(&params.instance_id) else {
            return Response::error(format!("Instance not found: {}", params.instance_id));
        };
        instance.component.set_property(&params.key, params.value);
        Response::ok()
    }

    fn handle_resize(&mut self, msg: &Value) -> Response {
        let params: ResizeParams = match serde_json::from_value(msg.clone()) {
            Ok(p) => p,
            Err(e) => return Response::error(e.to_string()),
        };
        let Some(instance) = self.registry.instance_mut(&params.instance_id) else {
            return Response::error(format!("Instance not found: {}", params.instance_id));
        };
        instance.component.on_resize(params.width, params.height);
        Response::ok()
    }

    fn handle_mouse_event(&mut self, msg: &Value) -> Response {
        let params: MouseEventParams = match serde_json::from_value(msg.clone()) {
            Ok(p) => p,
            Err(e) => return Response::error(e.to_string()),
        };
        let Some(instance) = self.registry.instance_mut(&params.instance_id) else {
            return Response::error(format!("Instance not found: {}", params.instance_id));
        };
        match params.event.as_str() {
            "down" => instance.component.on_mouse_down(params.x, params.y, params.button),
            "move" => instance.component.on_mouse_move(params.x, params.y),
            "up" => instance.component.on_mouse_up(params.x, params.y, params.button),
            other => warn!("Ignoring unknown mouse event phase '{other}'"),
        }
        Response::ok()
    }

    fn handle_destroy(&mut self, msg: &Value) -> Response {
        let params: InstanceParams = match serde_json::from_value(msg.clone()) {
            Ok(p) => p,
            Err(e) => return Response::error(e.to_string()),
        };
        // Destroy always acks; an unknown id is logged, not an error.
        if !self.registry.destroy_instance(&params.instance_id) {
            warn!("Destroy requested for unknown instance {}", params.instance_id);
        }
        self.instance_errors.remove(&params.instance_id);
        Response::ok()
    }

    fn handle_save(&mut self) -> Response {
        Response::SaveData {
            instances: self.registry.serialize_all(),
        }
    }

    fn handle_load(&mut self, msg: &Value) -> Response {
        let params: LoadParams = match serde_json::from_value(msg.clone()) {
            Ok(p) => p,
            Err(e) => return Response::error(e.to_string()),
        };
        self.registry.deserialize_all(params.instances);
        Response::ok()
    }

    fn handle_reload(&mut self, msg: &Value) -> Response {
        let params: ReloadParams = match serde_json::from_value(msg.clone()) {
            Ok(p) => p,
            Err(e) => return Response::error(e.to_string()),
        };
        if self.registry.reload(&params.manifest_id) {
            Response::ok_message(format!("Reloaded {}", params.manifest_id))
        } else {
            Response::error(format!("Reload failed for {}", params.manifest_id))
        }
    }

    fn handle_shutdown(&mut self) -> Response {
        info!("Shutdown requested");
        self.registry.destroy_all();
        self.instance_errors.clear();
        self.shm.close();
        self.running = false;
        Response::ok_message("Shutting down")
    }

    fn send<W: Write>(&self, output: &mut W, response: &Response) {
        let payload = match serde_json::to_string(response) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode response: {e}");
                return;
            }
        };
        // Best effort: a write failure is logged, never retried, and does
        // not stop the loop.
        if let Err(e) = writeln!(output, "{payload}").and_then(|_| output.flush()) {
            warn!("Failed to write response: {e}");
        }
    }
}
