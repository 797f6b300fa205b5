//! ffmpeg invocation for a live DASH transcode
//!
//! One video output stream is always produced. Each probed audio track gets
//! its own output stream tagged with the track's language; a source with no
//! probed audio gets a single silent track instead so players always find
//! an audio adaptation set.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::TranscoderConfig;
use crate::media::{AudioTrack, UNDETERMINED_LANGUAGE};
use crate::source::MediaSource;
use crate::storage::{INIT_SEGMENT_TEMPLATE, MEDIA_SEGMENT_TEMPLATE};

/// Input used when the source has no audio to map
const SILENT_AUDIO_INPUT: &str = "anullsrc=channel_layout=stereo:sample_rate=48000";

/// Everything needed to start one transcoder run
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub source: MediaSource,
    /// Seconds into the source where output timeline 0 begins
    pub offset: f64,
    pub audio_tracks: Vec<AudioTrack>,
    /// Output manifest; segments are written next to it
    pub manifest_path: PathBuf,
}

impl TranscodeJob {
    /// Full ffmpeg argument list (program name excluded).
    pub fn build_args(&self, config: &TranscoderConfig) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into(), "-loglevel".into(), "error".into()];

        if self.source.is_remote() {
            args.push("-user_agent".into());
            args.push(config.user_agent.clone());
        }

        args.push("-ss".into());
        args.push(format_offset(self.offset));
        args.push("-i".into());
        args.push(self.source.locator.clone());

        if self.audio_tracks.is_empty() {
            args.extend(["-f".into(), "lavfi".into(), "-i".into(), SILENT_AUDIO_INPUT.into()]);
        }

        args.extend(video_args(config));

        if self.audio_tracks.is_empty() {
            args.extend(silent_audio_args(config));
        } else {
            for (out, track) in self.audio_tracks.iter().enumerate() {
                args.extend(audio_track_args(out, track, config));
            }
        }

        args.extend(dash_args(config));
        args.push(self.manifest_path.to_string_lossy().into_owned());
        args
    }

    /// A ready-to-spawn command. Stdout and stdin are detached; stderr is
    /// piped so the supervisor can log it.
    pub fn command(&self, config: &TranscoderConfig) -> Command {
        let mut cmd = Command::new(&config.ffmpeg_path);
        cmd.args(self.build_args(config))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn format_offset(offset: f64) -> String {
    if offset.fract() == 0.0 && offset.abs() <= u32::MAX as f64 {
        format!("{}", offset as u64)
    } else {
        format!("{:.3}", offset)
    }
}

fn video_args(config: &TranscoderConfig) -> Vec<String> {
    vec![
        "-map".into(),
        "0:v:0".into(),
        "-c:v".into(),
        config.video_codec.clone(),
        "-crf".into(),
        config.crf.to_string(),
        "-preset".into(),
        config.preset.clone(),
        "-tune".into(),
        config.tune.clone(),
        "-force_key_frames".into(),
        format!("expr:gte(t,n_forced*{})", config.keyframe_interval_secs),
        "-threads".into(),
        "0".into(),
    ]
}

fn audio_track_args(out: usize, track: &AudioTrack, config: &TranscoderConfig) -> Vec<String> {
    vec![
        "-map".into(),
        format!("0:a:{}", track.index),
        format!("-c:a:{}", out),
        config.audio_codec.clone(),
        format!("-b:a:{}", out),
        config.audio_bitrate.clone(),
        format!("-metadata:s:a:{}", out),
        format!("language={}", track.language_tag()),
    ]
}

fn silent_audio_args(config: &TranscoderConfig) -> Vec<String> {
    vec![
        "-map".into(),
        "1:a:0".into(),
        "-c:a:0".into(),
        config.audio_codec.clone(),
        "-b:a:0".into(),
        config.audio_bitrate.clone(),
        "-metadata:s:a:0".into(),
        format!("language={}", UNDETERMINED_LANGUAGE),
        "-shortest".into(),
    ]
}

fn dash_args(config: &TranscoderConfig) -> Vec<String> {
    vec![
        "-f".into(),
        "dash".into(),
        "-window_size".into(),
        config.window_size.to_string(),
        "-extra_window_size".into(),
        config.window_size.to_string(),
        "-seg_duration".into(),
        config.segment_duration_secs.to_string(),
        "-use_template".into(),
        "1".into(),
        "-use_timeline".into(),
        "1".into(),
        "-init_seg_name".into(),
        INIT_SEGMENT_TEMPLATE.into(),
        "-media_seg_name".into(),
        MEDIA_SEGMENT_TEMPLATE.into(),
    ]
}
