use super::catalog::{CatalogBuilder, CatalogError, DecodeError};
use super::value::{ArgCursor, ParamKind};
use super::{Command, DecodeCommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaySfxCommand {
    pub sfx_name: String,
    pub loop_count: i32,
}

impl Command for PlaySfxCommand {}

impl DecodeCommand for PlaySfxCommand {
    const PARAMS: &'static [ParamKind] = &[ParamKind::Text, ParamKind::Int];

    fn decode(args: &mut ArgCursor<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            sfx_name: args.text()?,
            loop_count: args.int()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneLoadCommand {
    pub city_name: String,
    pub scene_name: String,
}

impl Command for SceneLoadCommand {}

impl DecodeCommand for SceneLoadCommand {
    const PARAMS: &'static [ParamKind] = &[ParamKind::Text, ParamKind::Text];

    fn decode(args: &mut ArgCursor<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            city_name: args.text()?,
            scene_name: args.text()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueRenderTextCommand {
    pub dialogue_text: String,
}

impl Command for DialogueRenderTextCommand {}

impl DecodeCommand for DialogueRenderTextCommand {
    const PARAMS: &'static [ParamKind] = &[ParamKind::Text];

    fn decode(args: &mut ArgCursor<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            dialogue_text: args.text()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiDisplayCaptionCommand {
    pub texture_name: String,
    pub number_of_lines: i32,
}

impl Command for UiDisplayCaptionCommand {}

impl DecodeCommand for UiDisplayCaptionCommand {
    const PARAMS: &'static [ParamKind] = &[ParamKind::Text, ParamKind::Int];

    fn decode(args: &mut ArgCursor<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            texture_name: args.text()?,
            number_of_lines: args.int()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneOpenDoorCommand {
    pub object_id: i32,
}

impl Command for SceneOpenDoorCommand {}

impl DecodeCommand for SceneOpenDoorCommand {
    const PARAMS: &'static [ParamKind] = &[ParamKind::Int];

    fn decode(args: &mut ArgCursor<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            object_id: args.int()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraFadeInWhiteCommand;

impl Command for CameraFadeInWhiteCommand {}

impl DecodeCommand for CameraFadeInWhiteCommand {
    const PARAMS: &'static [ParamKind] = &[];

    fn decode(_args: &mut ArgCursor<'_>) -> Result<Self, DecodeError> {
        Ok(Self)
    }
}

/// Registers the built-in scene script opcodes.
pub fn sce_catalog() -> Result<CatalogBuilder, CatalogError> {
    let mut builder = CatalogBuilder::new();
    builder
        .register::<PlaySfxCommand>(4, "Play sound effect; params: sfx name, loop count")?
        .register::<SceneLoadCommand>(9, "Load scene; params: city name, scene name")?
        .register::<DialogueRenderTextCommand>(
            62,
            "Show dialogue text and wait for the player to confirm",
        )?
        .register::<UiDisplayCaptionCommand>(
            86,
            "Show full-screen caption; params: caption texture, number of lines",
        )?
        .register::<SceneOpenDoorCommand>(87, "Play door opening animation")?
        .register::<CameraFadeInWhiteCommand>(91, "Fade screen in from white")?;
    Ok(builder)
}
