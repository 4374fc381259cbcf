//! Personality archetypes and the colors derived from them.

use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::FlowError;

/// One of the five personality archetypes offered in the survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Personality {
    Passionate,
    Analytical,
    Creative,
    Ambitious,
    Empathetic,
}

impl Personality {
    pub const ALL: [Personality; 5] = [
        Self::Passionate,
        Self::Analytical,
        Self::Creative,
        Self::Ambitious,
        Self::Empathetic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passionate => "Passionate",
            Self::Analytical => "Analytical",
            Self::Creative => "Creative",
            Self::Ambitious => "Ambitious",
            Self::Empathetic => "Empathetic",
        }
    }
}

impl std::fmt::Display for Personality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Personality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| format!("unknown personality: {s}"))
    }
}

/// Display color for an archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorChoice {
    pub code: &'static str,
    pub name: &'static str,
}

const COLOR_TABLE: [(Personality, ColorChoice); 5] = [
    (Personality::Passionate, ColorChoice { code: "#FF6B6B", name: "Red" }),
    (Personality::Analytical, ColorChoice { code: "#95A5A6", name: "Gray" }),
    (Personality::Creative, ColorChoice { code: "#4ECDC4", name: "Teal" }),
    (Personality::Ambitious, ColorChoice { code: "#F7B731", name: "Yellow" }),
    (Personality::Empathetic, ColorChoice { code: "#A55EEA", name: "Purple" }),
];

/// Used when no personality has been picked.
pub const FALLBACK_PERSONALITY: Personality = Personality::Creative;

/// Color for a personality; unset falls back to Creative / Teal.
pub fn color_for(personality: Option<Personality>) -> ColorChoice {
    let wanted = personality.unwrap_or(FALLBACK_PERSONALITY);
    COLOR_TABLE
        .iter()
        .find(|(p, _)| *p == wanted)
        .map(|(_, c)| *c)
        .unwrap_or(ColorChoice {
            code: "#4ECDC4",
            name: "Teal",
        })
}

/// Personality for a raw name as sent by a client. Unrecognized names get
/// the fallback.
pub fn personality_or_fallback(name: &str) -> Personality {
    name.parse().unwrap_or_else(|_| {
        warn!(name, fallback = %FALLBACK_PERSONALITY, "Unrecognized personality");
        FALLBACK_PERSONALITY
    })
}

/// Color for a raw personality name; unrecognized names get the fallback.
pub fn color_for_name(name: &str) -> ColorChoice {
    color_for(Some(personality_or_fallback(name)))
}

/// Serde adapter for client-supplied personalities: any string is accepted
/// and mapped through [`personality_or_fallback`].
pub(crate) fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<Personality>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|name| personality_or_fallback(&name)))
}

/// Invite deeplink for a finished signup: `{base}/invite/{user_id}?color=RRGGBB`.
pub fn share_link(
    base: &str,
    user_id: &str,
    personality: Option<Personality>,
) -> Result<Url, FlowError> {
    let mut url = Url::parse(base).map_err(|e| FlowError::InvalidLinkBase(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(FlowError::InvalidLinkBase(base.to_string()));
    }
    url.path_segments_mut()
        .map_err(|_| FlowError::InvalidLinkBase(base.to_string()))?
        .pop_if_empty()
        .push("invite")
        .push(user_id);
    let color = color_for(personality);
    url.query_pairs_mut()
        .clear()
        .append_pair("color", color.code.trim_start_matches('#'));
    Ok(url)
}
