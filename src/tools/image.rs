//! Scene render tool.
//!
//! Composes a render request for a painted room. Pixel synthesis happens
//! in an external renderer; this tool only resolves colour, room and style
//! into a prompt the renderer accepts.

use std::fmt::Write;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{GENERATE_IMAGE, ToolDescriptor, ToolHandler, parse_args, schema_of, to_payload};
use crate::agent::swatch::{NEUTRAL_HEX, hex_for, is_hex};
use crate::error::ToolError;

/// Default render edge in pixels.
const RENDER_SIZE: u32 = 1024;

/// Arguments of `generate_image`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageArgs {
    /// What the user asked for, verbatim.
    #[serde(default)]
    pub prompt: String,
    /// Colour name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Colour as `#rrggbb`; wins over `color`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    /// Room to render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Decoration style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

/// Render request produced by the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRender {
    /// Prompt handed to the renderer.
    pub render_prompt: String,
    /// Wall colour.
    pub hex: String,
    /// Room rendered.
    pub room: String,
    /// Style, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl GenerateImageArgs {
    /// Resolves the arguments into a render request.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] for a malformed `hex`.
    pub fn render(&self) -> Result<ImageRender, ToolError> {
        let hex = match (&self.hex, &self.color) {
            (Some(hex), _) if is_hex(hex) => hex.to_ascii_lowercase(),
            (Some(hex), _) => {
                return Err(ToolError::InvalidArguments {
                    name: GENERATE_IMAGE.to_string(),
                    message: format!("hex must be #rrggbb, got {hex}"),
                });
            }
            (None, Some(color)) => hex_for(color).unwrap_or(NEUTRAL_HEX).to_string(),
            (None, None) => NEUTRAL_HEX.to_string(),
        };
        let room = self.room.clone().unwrap_or_else(|| "sala".to_string());

        let mut render_prompt = format!("Interior photo of a {room} with walls painted {hex}");
        if let Some(color) = &self.color {
            let _ = write!(render_prompt, " ({color})");
        }
        if let Some(style) = &self.style {
            let _ = write!(render_prompt, ", {style} style");
        }
        if !self.prompt.trim().is_empty() {
            let _ = write!(render_prompt, ". Request: {}", self.prompt.trim());
        }

        Ok(ImageRender {
            render_prompt,
            hex,
            room,
            style: self.style.clone(),
            width: RENDER_SIZE,
            height: RENDER_SIZE,
        })
    }
}

/// `generate_image` handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTool;

#[async_trait]
impl ToolHandler for ImageTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: GENERATE_IMAGE.to_string(),
            description: "Compose a render of a room painted in the requested colour \
                          (name or #rrggbb), optionally in a given style."
                .to_string(),
            input_schema: schema_of::<GenerateImageArgs>(),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: GenerateImageArgs = parse_args(GENERATE_IMAGE, arguments)?;
        to_payload(GENERATE_IMAGE, &args.render()?)
    }
}
