//! FFmpeg-based converter for image, audio and video formats.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::config::ConverterConfig;
use super::error::{classify_tool_failure, ConverterError};
use super::traits::{ConversionRequest, FileConverter};
use crate::job::ConversionOptions;
use crate::registry::FormatKind;

/// FFmpeg-based converter implementation.
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Default encoder for a target format, when the client does not
    /// override the codec.
    fn default_codec(target: &str) -> Option<&'static str> {
        match target {
            "mp3" => Some("libmp3lame"),
            "ogg" => Some("libvorbis"),
            "opus" => Some("libopus"),
            "aac" | "m4a" => Some("aac"),
            "flac" => Some("flac"),
            "wav" => Some("pcm_s16le"),
            "mp4" | "mkv" | "mov" => Some("libx264"),
            "webm" => Some("libvpx-vp9"),
            "avi" => Some("mpeg4"),
            _ => None,
        }
    }

    /// Maps client quality 1-100 onto ffmpeg's qscale 2-31 (lower is
    /// better) for image encoders.
    fn image_qscale(quality: u8) -> u32 {
        let quality = quality.clamp(1, 100) as u32;
        2 + (100 - quality) * 29 / 99
    }

    /// Maps client quality 1-100 onto libmp3lame's VBR scale 0-9 (lower
    /// is better).
    fn audio_vbr(quality: u8) -> u32 {
        let quality = quality.clamp(1, 100) as u32;
        (100 - quality) * 9 / 99
    }

    /// Maps client quality 1-100 onto x264/vp9 CRF 18-38 (lower is
    /// better). The range is clamped away from the extremes; CRF 0 makes
    /// enormous files and CRF 51 is unwatchable.
    fn video_crf(quality: u8) -> u32 {
        let quality = quality.clamp(1, 100) as u32;
        18 + (100 - quality) * 20 / 99
    }

    fn common_prefix(&self, input_path: &Path) -> Vec<String> {
        vec![
            "-y".to_string(), // Overwrite output
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
        ]
    }

    /// Builds ffmpeg arguments for image conversion.
    fn build_image_args(
        &self,
        input_path: &Path,
        output_path: &Path,
        target: &str,
        options: &ConversionOptions,
    ) -> Vec<String> {
        let mut args = self.common_prefix(input_path);

        if options.remove_metadata {
            args.extend(["-map_metadata".to_string(), "-1".to_string()]);
        }

        match target {
            "webp" => {
                if options.lossless {
                    args.extend(["-lossless".to_string(), "1".to_string()]);
                } else if let Some(quality) = options.quality {
                    args.extend([
                        "-quality".to_string(),
                        quality.clamp(1, 100).to_string(),
                    ]);
                }
            }
            "jpeg" => {
                if let Some(quality) = options.quality {
                    args.extend([
                        "-q:v".to_string(),
                        Self::image_qscale(quality).to_string(),
                    ]);
                }
            }
            _ => {}
        }

        args.extend(self.config.extra_ffmpeg_args.iter().cloned());
        args.push(output_path.to_string_lossy().to_string());
        args
    }

    /// Builds ffmpeg arguments for audio conversion.
    fn build_audio_args(
        &self,
        input_path: &Path,
        output_path: &Path,
        target: &str,
        options: &ConversionOptions,
    ) -> Vec<String> {
        let mut args = self.common_prefix(input_path);

        // Drop any embedded cover art stream.
        args.push("-vn".to_string());

        if options.remove_metadata {
            args.extend(["-map_metadata".to_string(), "-1".to_string()]);
        }

        let codec = options
            .codec
            .clone()
            .or_else(|| Self::default_codec(target).map(String::from));
        if let Some(codec) = codec {
            args.extend(["-c:a".to_string(), codec]);
        }

        if let Some(ref bitrate) = options.bitrate {
            args.extend(["-b:a".to_string(), bitrate.clone()]);
        } else if let Some(quality) = options.quality {
            match target {
                // Lossless targets take a compression level, not a VBR scale.
                "flac" => {
                    let level = (quality.clamp(1, 100) as u32) * 12 / 100;
                    args.extend(["-compression_level".to_string(), level.to_string()]);
                }
                "wav" => {}
                _ => {
                    args.extend(["-q:a".to_string(), Self::audio_vbr(quality).to_string()]);
                }
            }
        }

        args.extend(self.config.extra_ffmpeg_args.iter().cloned());
        args.push(output_path.to_string_lossy().to_string());
        args
    }

    /// Builds ffmpeg arguments for video conversion.
    fn build_video_args(
        &self,
        input_path: &Path,
        output_path: &Path,
        target: &str,
        options: &ConversionOptions,
    ) -> Vec<String> {
        let mut args = self.common_prefix(input_path);

        if options.remove_metadata {
            args.extend(["-map_metadata".to_string(), "-1".to_string()]);
        }

        let codec = options
            .codec
            .clone()
            .or_else(|| Self::default_codec(target).map(String::from));
        if let Some(codec) = codec {
            args.extend(["-c:v".to_string(), codec]);
        }

        if let Some(ref bitrate) = options.bitrate {
            args.extend(["-b:v".to_string(), bitrate.clone()]);
        } else if let Some(quality) = options.quality {
            args.extend([
                "-crf".to_string(),
                Self::video_crf(quality).to_string(),
                "-preset".to_string(),
                "medium".to_string(),
            ]);
        }

        // Keep the audio track as-is unless the container forces a change.
        args.extend(["-c:a".to_string(), "copy".to_string()]);

        args.extend(self.config.extra_ffmpeg_args.iter().cloned());
        args.push(output_path.to_string_lossy().to_string());
        args
    }

    fn output_path(&self, request: &ConversionRequest) -> PathBuf {
        self.config
            .scratch_dir
            .join(format!("{}.{}", request.job_id, request.target_format))
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<(), ConverterError> {
        let child = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::ToolNotFound {
                        tool: "ffmpeg".to_string(),
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let output = match timeout(timeout_duration, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                // wait_with_output consumed the child; kill_on_drop reaps it.
                return Err(ConverterError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_tool_failure("ffmpeg", output.status.code(), &stderr));
        }
        Ok(())
    }
}

#[async_trait]
impl FileConverter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn kinds(&self) -> &[FormatKind] {
        &[FormatKind::Image, FormatKind::Audio, FormatKind::Video]
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, ConverterError> {
        if !request.input_path.exists() {
            return Err(ConverterError::InputNotFound {
                path: request.input_path.clone(),
            });
        }

        tokio::fs::create_dir_all(&self.config.scratch_dir)
            .await
            .map_err(|_| ConverterError::ScratchDirFailed {
                path: self.config.scratch_dir.clone(),
            })?;

        let output_path = self.output_path(request);
        let kind = crate::registry::kind_of(&request.target_format);

        let args = match kind {
            Some(FormatKind::Image) => self.build_image_args(
                &request.input_path,
                &output_path,
                &request.target_format,
                &request.options,
            ),
            Some(FormatKind::Audio) => self.build_audio_args(
                &request.input_path,
                &output_path,
                &request.target_format,
                &request.options,
            ),
            Some(FormatKind::Video) => self.build_video_args(
                &request.input_path,
                &output_path,
                &request.target_format,
                &request.options,
            ),
            _ => {
                return Err(ConverterError::UnsupportedCodec {
                    reason: format!("ffmpeg does not handle target {}", request.target_format),
                })
            }
        };

        debug!("Running ffmpeg for job {}: {:?}", request.job_id, args);
        self.run_ffmpeg(&args).await?;

        if !output_path.exists() {
            return Err(ConverterError::OutputMissing { path: output_path });
        }
        Ok(output_path)
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        let result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(status) if status.success() => {}
            Ok(status) => {
                return Err(ConverterError::ToolFailed {
                    tool: "ffmpeg".to_string(),
                    code: status.code(),
                    reason: "ffmpeg -version failed".to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConverterError::ToolNotFound {
                    tool: "ffmpeg".to_string(),
                    path: self.config.ffmpeg_path.clone(),
                })
            }
            Err(e) => return Err(ConverterError::Io(e)),
        }

        tokio::fs::create_dir_all(&self.config.scratch_dir)
            .await
            .map_err(|_| ConverterError::ScratchDirFailed {
                path: self.config.scratch_dir.clone(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target: &str, options: ConversionOptions) -> ConversionRequest {
        ConversionRequest {
            job_id: "job-1".to_string(),
            input_path: PathBuf::from("/intake/in.bin"),
            source_format: "flac".to_string(),
            target_format: target.to_string(),
            options,
        }
    }

    #[test]
    fn test_build_audio_args_mp3_quality() {
        let converter = FfmpegConverter::with_defaults();
        let options = ConversionOptions {
            quality: Some(100),
            ..Default::default()
        };
        let req = request("mp3", options);

        let args = converter.build_audio_args(
            &req.input_path,
            Path::new("/out/job-1.mp3"),
            "mp3",
            &req.options,
        );

        assert!(args.contains(&"-c:a".to_string()));
        assert!(args.contains(&"libmp3lame".to_string()));
        assert!(args.contains(&"-q:a".to_string()));
        assert!(args.contains(&"0".to_string())); // quality 100 -> best VBR
        assert!(args.contains(&"-vn".to_string()));
    }

    #[test]
    fn test_build_audio_args_bitrate_wins_over_quality() {
        let converter = FfmpegConverter::with_defaults();
        let options = ConversionOptions {
            quality: Some(50),
            bitrate: Some("192k".to_string()),
            ..Default::default()
        };

        let args = converter.build_audio_args(
            Path::new("/in.flac"),
            Path::new("/out.mp3"),
            "mp3",
            &options,
        );

        assert!(args.contains(&"-b:a".to_string()));
        assert!(args.contains(&"192k".to_string()));
        assert!(!args.contains(&"-q:a".to_string()));
    }

    #[test]
    fn test_build_audio_args_codec_override() {
        let converter = FfmpegConverter::with_defaults();
        let options = ConversionOptions {
            codec: Some("libopus".to_string()),
            ..Default::default()
        };

        let args = converter.build_audio_args(
            Path::new("/in.wav"),
            Path::new("/out.ogg"),
            "ogg",
            &options,
        );

        assert!(args.contains(&"libopus".to_string()));
        assert!(!args.contains(&"libvorbis".to_string()));
    }

    #[test]
    fn test_build_audio_args_remove_metadata() {
        let converter = FfmpegConverter::with_defaults();
        let options = ConversionOptions {
            remove_metadata: true,
            ..Default::default()
        };

        let args = converter.build_audio_args(
            Path::new("/in.mp3"),
            Path::new("/out.ogg"),
            "ogg",
            &options,
        );

        let pos = args.iter().position(|a| a == "-map_metadata").unwrap();
        assert_eq!(args[pos + 1], "-1");
    }

    #[test]
    fn test_build_video_args_crf() {
        let converter = FfmpegConverter::with_defaults();
        let options = ConversionOptions {
            quality: Some(100),
            ..Default::default()
        };

        let args = converter.build_video_args(
            Path::new("/in.avi"),
            Path::new("/out.mp4"),
            "mp4",
            &options,
        );

        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-crf".to_string()));
        assert!(args.contains(&"18".to_string())); // quality 100 -> floor of the range
        assert!(args.contains(&"-preset".to_string()));
    }

    #[test]
    fn test_build_image_args_webp_lossless() {
        let converter = FfmpegConverter::with_defaults();
        let options = ConversionOptions {
            lossless: true,
            quality: Some(80),
            ..Default::default()
        };

        let args = converter.build_image_args(
            Path::new("/in.png"),
            Path::new("/out.webp"),
            "webp",
            &options,
        );

        assert!(args.contains(&"-lossless".to_string()));
        assert!(!args.contains(&"-quality".to_string()));
    }

    #[test]
    fn test_build_image_args_jpeg_quality() {
        let converter = FfmpegConverter::with_defaults();
        let options = ConversionOptions {
            quality: Some(1),
            ..Default::default()
        };

        let args = converter.build_image_args(
            Path::new("/in.png"),
            Path::new("/out.jpeg"),
            "jpeg",
            &options,
        );

        assert!(args.contains(&"-q:v".to_string()));
        assert!(args.contains(&"31".to_string())); // worst quality -> highest qscale
    }

    #[test]
    fn test_quality_mappings_monotonic() {
        assert!(FfmpegConverter::image_qscale(100) < FfmpegConverter::image_qscale(1));
        assert!(FfmpegConverter::audio_vbr(100) < FfmpegConverter::audio_vbr(1));
        assert!(FfmpegConverter::video_crf(100) < FfmpegConverter::video_crf(1));
        assert_eq!(FfmpegConverter::image_qscale(100), 2);
        assert_eq!(FfmpegConverter::audio_vbr(100), 0);
        assert_eq!(FfmpegConverter::video_crf(100), 18);
        assert_eq!(FfmpegConverter::video_crf(1), 38);
    }

    #[test]
    fn test_kinds() {
        let converter = FfmpegConverter::with_defaults();
        assert_eq!(
            converter.kinds(),
            &[FormatKind::Image, FormatKind::Audio, FormatKind::Video]
        );
    }
}
