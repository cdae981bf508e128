use tracing::{debug, info};

use crate::host::SongEngine;

/// Volume a fresh session starts at.
pub const DEFAULT_VOLUME: i32 = 100;

/// Playback state kept by the reference worker.
///
/// Pausing remembers the current volume and mutes; resuming restores it.
/// Volume changes made while paused take effect on resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongSession {
    song: Vec<u8>,
    playing: bool,
    looping: bool,
    paused: bool,
    volume: i32,
    paused_volume: Option<i32>,
}

impl Default for SongSession {
    fn default() -> Self {
        Self {
            song: Vec::new(),
            playing: false,
            looping: false,
            paused: false,
            volume: DEFAULT_VOLUME,
            paused_volume: None,
        }
    }
}

impl SongSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn song(&self) -> &[u8] {
        &self.song
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Volume currently applied to output (0 while paused).
    pub fn volume(&self) -> i32 {
        self.volume
    }

    fn unpause(&mut self) {
        if let Some(level) = self.paused_volume.take() {
            self.volume = level;
        }
        self.paused = false;
    }
}

impl SongEngine for SongSession {
    fn prepare_new_song(&mut self) -> Result<(), String> {
        self.stop_song()?;
        self.song.clear();
        Ok(())
    }

    fn add_chunk(&mut self, data: &[u8]) -> Result<(), String> {
        self.song.extend_from_slice(data);
        debug!(
            chunk = data.len(),
            total = self.song.len(),
            "song data received"
        );
        Ok(())
    }

    fn play_song(&mut self, looping: bool) -> Result<(), String> {
        if self.song.is_empty() {
            return Err("no song registered".to_string());
        }
        self.unpause();
        self.playing = true;
        self.looping = looping;
        info!(size = self.song.len(), looping, "playing song");
        Ok(())
    }

    fn stop_song(&mut self) -> Result<(), String> {
        self.unpause();
        if self.playing {
            info!("song stopped");
        }
        self.playing = false;
        Ok(())
    }

    fn change_volume(&mut self, level: i32) -> Result<(), String> {
        if self.paused {
            self.paused_volume = Some(level);
        } else {
            self.volume = level;
        }
        debug!(level, paused = self.paused, "volume changed");
        Ok(())
    }

    fn pause_song(&mut self) -> Result<(), String> {
        if self.playing && !self.paused {
            self.paused_volume = Some(self.volume);
            self.volume = 0;
            self.paused = true;
        }
        Ok(())
    }

    fn resume_song(&mut self) -> Result<(), String> {
        if self.paused {
            self.unpause();
        }
        Ok(())
    }
}
