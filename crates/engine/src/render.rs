use std::path::{Path, PathBuf};

/// Object-storage prefix for assembled videos.
pub const GENERATED_PREFIX: &str = "generated/";

/// Audio codec the replacement track is encoded with.
pub const AUDIO_CODEC: &str = "aac";

pub struct RenderCommand {
    pub ffmpeg_args: Vec<String>,
    pub output_path: PathBuf,
}

/// Build the ffmpeg arguments that mux a video with a replacement audio track.
///
/// The video stream is copied as-is. With an audio input, its first audio
/// stream becomes the only audio track (the video's own audio is discarded,
/// nothing is mixed, trimmed or looped). Without one the output has no audio.
pub fn generate_mux_command(video: &Path, audio: Option<&Path>, output_path: PathBuf) -> RenderCommand {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        video.to_string_lossy().to_string(),
    ];

    match audio {
        Some(audio) => {
            args.push("-i".into());
            args.push(audio.to_string_lossy().to_string());
            args.extend(
                ["-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", AUDIO_CODEC]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        None => {
            args.extend(
                ["-map", "0:v:0", "-c:v", "copy", "-an"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
    }

    args.push(output_path.to_string_lossy().to_string());

    RenderCommand {
        ffmpeg_args: args,
        output_path,
    }
}

/// File name of an assembled video. The source video id and timestamp keep
/// it traceable; `suffix` keeps same-second runs apart.
pub fn output_file_name(video_id: i64, unix_timestamp: i64, suffix: &str) -> String {
    format!("video_final_{}_{}_{}.mp4", video_id, unix_timestamp, suffix)
}

pub fn generated_object_name(file_name: &str) -> String {
    format!("{}{}", GENERATED_PREFIX, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_audio_track_and_copies_video() {
        let cmd = generate_mux_command(
            Path::new("/scratch/source_video.mp4"),
            Some(Path::new("/scratch/source_audio.mp3")),
            PathBuf::from("/scratch/out.mp4"),
        );
        let args = cmd.ffmpeg_args.join(" ");
        assert!(args.contains("-i /scratch/source_video.mp4 -i /scratch/source_audio.mp3"));
        assert!(args.contains("-map 0:v:0 -map 1:a:0"));
        assert!(args.contains("-c:v copy -c:a aac"));
        assert!(!args.contains("-shortest"));
        assert!(!args.contains("amix"));
        assert_eq!(cmd.ffmpeg_args.last().unwrap(), "/scratch/out.mp4");
    }

    #[test]
    fn video_only_drops_audio() {
        let cmd = generate_mux_command(
            Path::new("in.mp4"),
            None,
            PathBuf::from("out.mp4"),
        );
        assert!(cmd.ffmpeg_args.contains(&"-an".to_string()));
        assert!(!cmd.ffmpeg_args.contains(&"1:a:0".to_string()));
        assert_eq!(cmd.output_path, PathBuf::from("out.mp4"));
    }

    #[test]
    fn output_names() {
        let name = output_file_name(7, 1_760_600_000, "3f2a9c1b");
        assert_eq!(name, "video_final_7_1760600000_3f2a9c1b.mp4");
        assert_eq!(
            generated_object_name(&name),
            "generated/video_final_7_1760600000_3f2a9c1b.mp4"
        );
    }
}
