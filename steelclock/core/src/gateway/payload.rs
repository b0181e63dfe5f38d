//! JSON envelopes for the gateway endpoints

use serde::Serialize;

use crate::bitmap::FrameMap;

/// `/bind_game_event`
#[derive(Debug, Serialize)]
pub(crate) struct BindGameEvent<'a> {
    pub game: &'a str,
    pub event: &'a str,
    pub handlers: [ScreenHandler<'a>; 1],
}

#[derive(Debug, Serialize)]
pub(crate) struct ScreenHandler<'a> {
    #[serde(rename = "device-type")]
    pub device_type: &'a str,
    pub mode: &'static str,
    pub datas: [HandlerData; 1],
}

#[derive(Debug, Serialize)]
pub(crate) struct HandlerData {
    #[serde(rename = "has-text")]
    pub has_text: bool,
    #[serde(rename = "image-data")]
    pub image_data: Vec<u8>,
}

impl<'a> BindGameEvent<'a> {
    /// Screen binding with a blank placeholder image
    pub fn screen(game: &'a str, event: &'a str, resolution_token: &'a str, frame_len: usize) -> Self {
        Self {
            game,
            event,
            handlers: [ScreenHandler {
                device_type: resolution_token,
                mode: "screen",
                datas: [HandlerData {
                    has_text: false,
                    image_data: vec![0; frame_len],
                }],
            }],
        }
    }
}

/// `data` object of a screen event
#[derive(Debug, Serialize)]
pub(crate) struct EventData<'a> {
    pub frame: &'a FrameMap,
}

/// `/game_event`
#[derive(Debug, Serialize)]
pub(crate) struct GameEvent<'a> {
    pub game: &'a str,
    pub event: &'a str,
    pub data: EventData<'a>,
}

/// One entry of `/multiple_game_events`
#[derive(Debug, Serialize)]
pub(crate) struct EventEntry<'a> {
    pub event: &'a str,
    pub data: EventData<'a>,
}

/// `/multiple_game_events`
#[derive(Debug, Serialize)]
pub(crate) struct MultipleGameEvents<'a> {
    pub game: &'a str,
    pub events: Vec<EventEntry<'a>>,
}

impl<'a> MultipleGameEvents<'a> {
    pub fn new(game: &'a str, event: &'a str, frames: &'a [FrameMap]) -> Self {
        Self {
            game,
            events: frames
                .iter()
                .map(|frame| EventEntry {
                    event,
                    data: EventData { frame },
                })
                .collect(),
        }
    }
}

/// `/game_heartbeat` and `/remove_game`
#[derive(Debug, Serialize)]
pub(crate) struct GameOnly<'a> {
    pub game: &'a str,
}
