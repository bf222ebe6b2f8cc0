use crate::error::CompileError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type ActionId = u64;

/// Dispatch id of the play-sound action in the player.
pub const ACTION_PLAY_SOUND: ActionId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SoundType {
    /// Text spoken by the player's speech synthesis
    Text = 0,
    /// URL of a pre-recorded clip
    Audio = 1,
}

impl TryFrom<u8> for SoundType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SoundType::Text),
            1 => Ok(SoundType::Audio),
            other => Err(format!("unknown sound type {}", other)),
        }
    }
}

impl From<SoundType> for u8 {
    fn from(value: SoundType) -> Self {
        value as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaySound {
    #[serde(rename = "SoundType")]
    pub sound_type: SoundType,
    #[serde(rename = "Value")]
    pub value: String,
}

impl PlaySound {
    pub fn text(value: impl Into<String>) -> Self {
        Self { sound_type: SoundType::Text, value: value.into() }
    }

    pub fn audio(url: impl Into<String>) -> Self {
        Self { sound_type: SoundType::Audio, value: url.into() }
    }

    /// `[sound type][utf8 value]`; framing is added by the bundle encoder.
    pub fn compile(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.value.len());
        bytes.push(self.sound_type as u8);
        bytes.extend_from_slice(self.value.as_bytes());
        bytes
    }
}

/// One runtime-executable effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeAction {
    PlaySound(PlaySound),
}

impl RuntimeAction {
    pub fn action_id(&self) -> ActionId {
        match self {
            RuntimeAction::PlaySound(_) => ACTION_PLAY_SOUND,
        }
    }

    pub fn compile(&self) -> Vec<u8> {
        match self {
            RuntimeAction::PlaySound(sound) => sound.compile(),
        }
    }
}

/// Ordered set of actions, executed front to back by the player.
///
/// Authored as `{"PlaySounds": [...]}`; an action kind the compiler does not
/// know is rejected instead of being dropped from the bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct ActionSet {
    actions: Vec<RuntimeAction>,
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, action: RuntimeAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn push(&mut self, action: RuntimeAction) {
        self.actions.push(action);
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuntimeAction> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Decodes a raw JSON column. `null` is an empty set.
    pub fn from_json(value: &Value) -> Result<Self, CompileError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Self::try_from(map.clone()),
            other => Err(CompileError::LogicDecode {
                owner: "action set".to_string(),
                message: format!("expected an object, found {}", other),
            }),
        }
    }
}

impl TryFrom<Map<String, Value>> for ActionSet {
    type Error = CompileError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut set = ActionSet::default();
        for (kind, value) in map {
            match kind.as_str() {
                "PlaySounds" => {
                    if value.is_null() {
                        continue;
                    }
                    let sounds: Vec<PlaySound> = serde_json::from_value(value).map_err(|e| {
                        CompileError::LogicDecode { owner: "PlaySounds".to_string(), message: e.to_string() }
                    })?;
                    for sound in sounds {
                        set.push(RuntimeAction::PlaySound(sound));
                    }
                }
                _ => return Err(CompileError::UnknownActionKind(kind)),
            }
        }
        Ok(set)
    }
}
