//! Character personas and the immutable character table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::voice::VoiceProvider;

/// One voice identifier per synthesis provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceIds {
    #[serde(rename = "elevenLabsVoiceId")]
    pub elevenlabs: String,
    #[serde(rename = "playhtVoiceId")]
    pub playht: String,
    #[serde(rename = "openaiVoice")]
    pub openai: String,
}

impl VoiceIds {
    pub fn get(&self, provider: VoiceProvider) -> &str {
        match provider {
            VoiceProvider::ElevenLabs => &self.elevenlabs,
            VoiceProvider::PlayHt => &self.playht,
            VoiceProvider::OpenAi => &self.openai,
        }
    }

    fn set(&mut self, provider: VoiceProvider, voice_id: String) {
        match provider {
            VoiceProvider::ElevenLabs => self.elevenlabs = voice_id,
            VoiceProvider::PlayHt => self.playht = voice_id,
            VoiceProvider::OpenAi => self.openai = voice_id,
        }
    }
}

/// A persona that drives the chat system prompt and voice selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,
    pub description: String,
    pub personality: String,
    pub system_prompt: String,
    #[serde(flatten)]
    pub voices: VoiceIds,
}

/// Read-only table of characters keyed by id, built once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CharacterTable {
    characters: BTreeMap<String, Character>,
}

impl CharacterTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from a list. A later entry replaces an earlier one with the same id.
    pub fn from_characters(characters: impl IntoIterator<Item = Character>) -> Self {
        Self {
            characters: characters
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
        }
    }

    /// The built-in personas.
    pub fn builtin() -> Self {
        Self::from_characters(builtin_characters())
    }

    pub fn get(&self, id: &str) -> Option<&Character> {
        self.characters.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.characters.contains_key(id)
    }

    /// Voice id a character uses with the given provider.
    pub fn voice_for(&self, id: &str, provider: VoiceProvider) -> Option<&str> {
        self.get(id).map(|c| c.voices.get(provider))
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.characters.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    /// Apply per-character voice overrides named `<PROVIDER>_<ID>_VOICE_ID`,
    /// e.g. `ELEVENLABS_SHERLOCK_VOICE_ID`. `lookup` is usually `std::env::var`.
    pub fn with_voice_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for character in self.characters.values_mut() {
            for provider in VoiceProvider::ALL {
                let key = format!(
                    "{}_{}_VOICE_ID",
                    provider.as_str().to_ascii_uppercase(),
                    character.id.to_ascii_uppercase()
                );
                if let Some(voice_id) = lookup(&key).filter(|v| !v.is_empty()) {
                    character.voices.set(provider, voice_id);
                }
            }
        }
        self
    }
}

fn persona(
    id: &str,
    name: &str,
    description: &str,
    personality: &str,
    system_prompt: &str,
    voices: [&str; 3],
) -> Character {
    let [elevenlabs, playht, openai] = voices;
    Character {
        id: id.into(),
        name: name.into(),
        description: description.into(),
        personality: personality.into(),
        system_prompt: system_prompt.into(),
        voices: VoiceIds {
            elevenlabs: elevenlabs.into(),
            playht: playht.into(),
            openai: openai.into(),
        },
    }
}

fn builtin_characters() -> Vec<Character> {
    vec![
        persona(
            "sherlock",
            "Sherlock Holmes",
            "The brilliant detective from 221B Baker Street",
            "Analytical, observant, and slightly arrogant. Loves solving mysteries and deducing facts from small details.",
            "You are Sherlock Holmes, the world's greatest detective. You are brilliant, observant, and slightly arrogant. You love solving mysteries and deducing facts from small details. You speak in a British accent and often use phrases like 'Elementary, my dear Watson' and 'The game is afoot!'",
            [
                "21m00Tcm4TlvDq8ikWAM",
                "s3://voice-cloning-zero-shot/baf1ef41-36b6-428c-9bdf-50ba54682bd8/original/manifest.json",
                "alloy",
            ],
        ),
        persona(
            "gandalf",
            "Gandalf the Grey",
            "The wise wizard from Middle-earth",
            "Wise, mysterious, and powerful. Speaks in riddles and ancient wisdom.",
            "You are Gandalf the Grey, a wise and powerful wizard from Middle-earth. You are mysterious, knowledgeable about ancient lore, and speak with wisdom and authority. You often use phrases like 'You shall not pass!' and 'All we have to decide is what to do with the time that is given us.'",
            [
                "EXAVITQu4vr4xnSDxMaL",
                "s3://voice-cloning-zero-shot/2a7ddfc5-d16a-423a-9441-5b13290998b8/novasaad/manifest.json",
                "echo",
            ],
        ),
        persona(
            "tony",
            "Tony Stark",
            "The genius billionaire playboy philanthropist",
            "Witty, brilliant, and confident. Loves technology and making jokes.",
            "You are Tony Stark, the genius billionaire playboy philanthropist. You are witty, brilliant, and confident. You love technology, making jokes, and being sarcastic. You often reference your suits, technology, and use phrases like 'I am Iron Man' and 'Sometimes you gotta run before you can walk.'",
            [
                "VR6AewLTigWG4xSOukaG",
                "s3://voice-cloning-zero-shot/801a663f-efd0-4254-98d0-5c175514c3e8/jennifer/manifest.json",
                "fable",
            ],
        ),
        persona(
            "yoda",
            "Master Yoda",
            "The wise Jedi Master",
            "Wise, patient, and speaks in a unique word order.",
            "You are Master Yoda, the wise Jedi Master. You are patient, wise, and speak in a unique word order (object-subject-verb). You often use phrases like 'Do or do not, there is no try' and 'Fear is the path to the dark side.'",
            [
                "pNInz6obpgDQGcFmaJgB",
                "s3://voice-cloning-zero-shot/d82d246c-148b-457f-9668-37b789520891/adolfosaad/manifest.json",
                "onyx",
            ],
        ),
        persona(
            "hermione",
            "Hermione Granger",
            "The brilliant witch from Hogwarts",
            "Intelligent, logical, and slightly bossy. Loves books and following rules.",
            "You are Hermione Granger, the brilliant witch from Hogwarts. You are intelligent, logical, and slightly bossy. You love books, learning, and following rules. You often use phrases like 'It's leviosa, not leviosar!' and 'I've read about this in Hogwarts: A History.'",
            [
                "AZnzlk1XvdvUeBnXmlld",
                "s3://voice-cloning-zero-shot/d9ff78ba-d016-47f6-b0ef-dd630f59414e/female-cs/manifest.json",
                "nova",
            ],
        ),
    ]
}
