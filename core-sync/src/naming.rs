//! Local shot names.
//!
//! The pipeline names a shot `<sequence>-<shot>`, and `<episode>.<sequence>-<shot>`
//! in TV show projects. The first `-` separates sequence and shot; the first
//! `.` of the sequence part separates the episode.

use crate::error::{Result, SyncError};
use bridge_traits::entity::ProductionType;
use std::fmt;

/// Episode used for TV show shots whose name carries no episode.
pub const DEFAULT_EPISODE: &str = "Main Pack";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShotPath {
    pub episode: Option<String>,
    pub sequence: String,
    pub shot: String,
}

impl ShotPath {
    pub fn new(
        episode: Option<impl Into<String>>,
        sequence: impl Into<String>,
        shot: impl Into<String>,
    ) -> Self {
        Self {
            episode: episode.map(Into::into),
            sequence: sequence.into(),
            shot: shot.into(),
        }
    }

    /// Split a local name. Episodes are only read for TV shows; feature
    /// projects keep any `.` as part of the sequence name.
    pub fn parse(local_name: &str, production_type: ProductionType) -> Result<Self> {
        let (sequence_part, shot) = local_name
            .split_once('-')
            .ok_or_else(|| {
                SyncError::invalid_name("shot", local_name, "expected <sequence>-<shot>")
            })?;

        if shot.is_empty() {
            return Err(SyncError::invalid_name("shot", local_name, "shot part is empty"));
        }

        let (episode, sequence) = if production_type.has_episodes() {
            match sequence_part.split_once('.') {
                Some((episode, sequence)) if !episode.is_empty() => {
                    (Some(episode.to_string()), sequence)
                }
                Some((_, sequence)) => (Some(DEFAULT_EPISODE.to_string()), sequence),
                None => (Some(DEFAULT_EPISODE.to_string()), sequence_part),
            }
        } else {
            (None, sequence_part)
        };

        if sequence.is_empty() {
            return Err(SyncError::invalid_name(
                "shot",
                local_name,
                "sequence part is empty",
            ));
        }

        Ok(Self {
            episode,
            sequence: sequence.to_string(),
            shot: shot.to_string(),
        })
    }

    /// Name of the local shot. Shots of the default episode carry no
    /// prefix, so the name parses back to the same path.
    pub fn local_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ShotPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.episode {
            Some(episode) if episode != DEFAULT_EPISODE => {
                write!(f, "{}.{}-{}", episode, self.sequence, self.shot)
            }
            _ => write!(f, "{}-{}", self.sequence, self.shot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_name() {
        let path = ShotPath::parse("SQ01-SH010", ProductionType::FeatureFilm).unwrap();
        assert_eq!(path, ShotPath::new(None::<String>, "SQ01", "SH010"));
        assert_eq!(path.local_name(), "SQ01-SH010");
    }

    #[test]
    fn test_only_first_dash_splits() {
        let path = ShotPath::parse("SQ01-SH010-A", ProductionType::Short).unwrap();
        assert_eq!(path.sequence, "SQ01");
        assert_eq!(path.shot, "SH010-A");
    }

    #[test]
    fn test_tv_show_episode_prefix() {
        let path = ShotPath::parse("EP01.SQ01-SH010", ProductionType::TvShow).unwrap();
        assert_eq!(path.episode.as_deref(), Some("EP01"));
        assert_eq!(path.sequence, "SQ01");
        assert_eq!(path.local_name(), "EP01.SQ01-SH010");
    }

    #[test]
    fn test_tv_show_without_episode_uses_default() {
        let path = ShotPath::parse("SQ01-SH010", ProductionType::TvShow).unwrap();
        assert_eq!(path.episode.as_deref(), Some(DEFAULT_EPISODE));
        assert_eq!(path.local_name(), "SQ01-SH010");
    }

    #[test]
    fn test_feature_keeps_dots_in_sequence() {
        let path = ShotPath::parse("EP01.SQ01-SH010", ProductionType::FeatureFilm).unwrap();
        assert_eq!(path.episode, None);
        assert_eq!(path.sequence, "EP01.SQ01");
    }

    #[test]
    fn test_rejects_incomplete_names() {
        for name in ["SH010", "-SH010", "SQ01-", "EP01.-SH010"] {
            assert!(
                matches!(
                    ShotPath::parse(name, ProductionType::TvShow),
                    Err(SyncError::InvalidName { .. })
                ),
                "{} should be rejected",
                name
            );
        }
    }
}
