use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::counters::CounterMap;
use crate::error::Result;

/// Broadcast event carrying the full counter map.
pub const UPDATE_EVENT: &str = "updateWords";

/// A named event on the push stream.
///
/// Accepted on the wire either as `{"event": .., "data": ..}` or as the
/// socket.io style tuple `["event", data]`. Always emitted as the object form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Frame")]
pub struct PushMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Frame {
    Named {
        event: String,
        #[serde(default)]
        data: Value,
    },
    Tuple(Vec<Value>),
}

impl TryFrom<Frame> for PushMessage {
    type Error = String;

    fn try_from(frame: Frame) -> std::result::Result<Self, Self::Error> {
        match frame {
            Frame::Named { event, data } => Ok(Self { event, data }),
            Frame::Tuple(items) => {
                let mut items = items.into_iter();
                match items.next() {
                    Some(Value::String(event)) => Ok(Self {
                        event,
                        data: items.next().unwrap_or(Value::Null),
                    }),
                    _ => Err("push frame must start with an event name".to_string()),
                }
            }
        }
    }
}

impl PushMessage {
    pub fn update(counters: &CounterMap) -> Result<Self> {
        Ok(Self {
            event: UPDATE_EVENT.to_string(),
            data: serde_json::to_value(counters)?,
        })
    }

    pub fn is_update(&self) -> bool {
        self.event == UPDATE_EVENT
    }
}

/// Decode one text frame. `Ok(None)` means the frame carried some other
/// event and should be ignored.
pub fn decode_update(text: &str) -> Result<Option<CounterMap>> {
    let message: PushMessage = serde_json::from_str(text)?;
    if !message.is_update() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(message.data)?))
}
