use crate::model::theme::{Background, Rgb};
use anyhow::{Result, anyhow, bail};
use log::{debug, info};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const FRAME_FILE_PATTERN: &str = "%08d.ppm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Positioned at the leading edge of the text.
    Start,
    /// Positioned at the text's center.
    Center,
}

/// One primitive of a composed frame. Sinks rasterize what they can; text
/// metrics belong to display sinks, which is why text carries an anchor
/// rather than a precomputed bounding box.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCmd {
    Rect {
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        color: Rgb,
        filled: bool,
        corner_radius: u32,
    },
    /// Full-width or full-height marker line, alpha-blended over the scene.
    Line {
        orientation: Orientation,
        position: i32,
        color: Rgb,
        alpha: u8,
    },
    Text {
        text: String,
        x: i32,
        y: i32,
        size_px: u32,
        color: Rgb,
        anchor: Anchor,
    },
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub background: Background,
    pub cmds: Vec<DrawCmd>,
}

impl Frame {
    pub fn new(width: u32, height: u32, background: Background) -> Self {
        Self {
            width,
            height,
            background,
            cmds: Vec::new(),
        }
    }
}

/// Where composed frames go: an interactive surface, or the numbered image
/// sequence an encoder consumes.
pub trait FrameSink {
    fn submit(&mut self, frame: &Frame) -> Result<()>;
}

/// Sink that throws frames away. Used for paced previews without a display.
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn submit(&mut self, _frame: &Frame) -> Result<()> {
        Ok(())
    }
}

/// Rasterizes frames into RGB and writes them as numbered binary PPM images,
/// ready for a one-shot encoder pass. Text commands are skipped; the export
/// pipeline renders primitives only.
#[derive(Debug)]
pub struct ImageSequenceSink {
    dir: PathBuf,
    frame_index: usize,
}

impl ImageSequenceSink {
    /// Deletes and recreates the frame directory so stale frames from an
    /// earlier run can't leak into the encoded video.
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if dir.is_dir() {
            fs::remove_dir_all(&dir)
                .map_err(|e| anyhow!("Failed to clear frame folder {}: {}", dir.display(), e))?;
        }
        fs::create_dir_all(&dir)
            .map_err(|e| anyhow!("Failed to create frame folder {}: {}", dir.display(), e))?;

        Ok(Self {
            dir,
            frame_index: 0,
        })
    }

    pub fn frames_written(&self) -> usize {
        self.frame_index
    }

    pub fn frame_pattern(&self) -> PathBuf {
        self.dir.join(FRAME_FILE_PATTERN)
    }
}

impl FrameSink for ImageSequenceSink {
    fn submit(&mut self, frame: &Frame) -> Result<()> {
        let pixels = rasterize(frame);
        let path = self.dir.join(format!("{:08}.ppm", self.frame_index));

        let mut file = fs::File::create(&path)
            .map_err(|e| anyhow!("Failed to create frame {}: {}", path.display(), e))?;
        write!(file, "P6\n{} {}\n255\n", frame.width, frame.height)?;
        file.write_all(&pixels)?;

        self.frame_index += 1;
        Ok(())
    }
}

/// CPU rasterizer for the export path: background fill, axis-aligned rects
/// (filled or 1px outline), and alpha-blended marker lines. Corner radii are
/// advisory and rendered square here.
fn rasterize(frame: &Frame) -> Vec<u8> {
    let (w, h) = (frame.width as usize, frame.height as usize);
    let mut pixels = vec![0u8; w * h * 3];

    match frame.background {
        Background::Solid(color) => {
            for px in pixels.chunks_exact_mut(3) {
                px.copy_from_slice(&[color.r, color.g, color.b]);
            }
        }
        Background::Gradient(top, bottom) => {
            for y in 0..h {
                let t = if h > 1 { y as f64 / (h - 1) as f64 } else { 0.0 };
                let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
                let row = (lerp(top.r, bottom.r), lerp(top.g, bottom.g), lerp(top.b, bottom.b));
                for x in 0..w {
                    let at = (y * w + x) * 3;
                    pixels[at] = row.0;
                    pixels[at + 1] = row.1;
                    pixels[at + 2] = row.2;
                }
            }
        }
    }

    let mut put = |x: i64, y: i64, color: Rgb, alpha: u8| {
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            return;
        }
        let at = (y as usize * w + x as usize) * 3;
        if alpha == 255 {
            pixels[at] = color.r;
            pixels[at + 1] = color.g;
            pixels[at + 2] = color.b;
        } else {
            let a = alpha as u32;
            let blend = |dst: u8, src: u8| ((dst as u32 * (255 - a) + src as u32 * a) / 255) as u8;
            pixels[at] = blend(pixels[at], color.r);
            pixels[at + 1] = blend(pixels[at + 1], color.g);
            pixels[at + 2] = blend(pixels[at + 2], color.b);
        }
    };

    for cmd in &frame.cmds {
        match cmd {
            DrawCmd::Rect {
                x,
                y,
                w: rw,
                h: rh,
                color,
                filled,
                corner_radius: _,
            } => {
                let (x0, y0) = (*x as i64, *y as i64);
                let (x1, y1) = (x0 + *rw as i64, y0 + *rh as i64);
                for py in y0..y1 {
                    for px in x0..x1 {
                        let on_edge = py == y0 || py == y1 - 1 || px == x0 || px == x1 - 1;
                        if *filled || on_edge {
                            put(px, py, *color, 255);
                        }
                    }
                }
            }
            DrawCmd::Line {
                orientation,
                position,
                color,
                alpha,
            } => match orientation {
                Orientation::Vertical => {
                    for py in 0..h as i64 {
                        put(*position as i64, py, *color, *alpha);
                    }
                }
                Orientation::Horizontal => {
                    for px in 0..w as i64 {
                        put(px, *position as i64, *color, *alpha);
                    }
                }
            },
            DrawCmd::Text { .. } => {}
        }
    }

    pixels
}

/// Hands a finished image sequence to ffmpeg in one blocking call. Fixed
/// arguments: H.264, constant-quality 25, even-dimension crop, overwrite.
pub fn encode_video(sink: &ImageSequenceSink, frame_rate: u32, output: &Path) -> Result<()> {
    let pattern = sink.frame_pattern();
    info!(
        "Encoding {} frames to {}...",
        sink.frames_written(),
        output.display()
    );

    let status = Command::new("ffmpeg")
        .arg("-r")
        .arg(frame_rate.to_string())
        .arg("-f")
        .arg("image2")
        .arg("-i")
        .arg(&pattern)
        .arg("-vcodec")
        .arg("libx264")
        .arg("-crf")
        .arg("25")
        .arg("-pix_fmt")
        .arg("yuv420p")
        .arg("-vf")
        .arg("crop=trunc(iw/2)*2:trunc(ih/2)*2")
        .arg("-y")
        .arg(output)
        .status()
        .map_err(|e| anyhow!("Failed to launch ffmpeg: {}", e))?;

    if !status.success() {
        bail!("ffmpeg exited with {}..!", status);
    }

    debug!("Encoder finished for {}", output.display());
    Ok(())
}
