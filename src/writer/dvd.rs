//! DVD+R/RW writer, backed by `growisofs`, which builds and burns the
//! image in a single step rather than going through a separate
//! `mkisofs`/`cdrecord` pair.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::command::CommandRunner;
use crate::config::MediaType;
use crate::error::{CedarError, Result};

use super::{check_capacity, refresh_media, MediaCapacity, MediaDefinition, OpticalWriter, WriterCore, WriterState};

/// Parses the `seek=N` line from a `growisofs -dry-run` probe and
/// converts it to sectors used (`16 * N`, per the tool's fixed sector
/// multiplier). Returns `None` if the probe produced no recognizable
/// `seek=` line, which callers treat as "zero bytes used so far".
pub fn parse_sectors_used(output: &str) -> Option<u64> {
    let re = Regex::new(r"seek=(\d+)").expect("static regex");
    let n: u64 = output.lines().find_map(|line| re.captures(line)).and_then(|c| c.get(1)?.as_str().parse().ok())?;
    Some(16 * n)
}

/// Parses growisofs's overburn warning:
/// `:-( <tool>: "Current Write Speed" is N: <blanks> blocks are free, M to
/// be written!` Returns `(blocks_free, blocks_required)`.
pub fn parse_overburn(output: &str) -> Option<(u64, u64)> {
    let re = Regex::new(r":-\(\s+.*:\s+(\d+)\s+blocks are free,\s+(\d+)\s+to be written!").expect("static regex");
    let caps = re.captures(output)?;
    let free: u64 = caps.get(1)?.as_str().parse().ok()?;
    let required: u64 = caps.get(2)?.as_str().parse().ok()?;
    Some((free, required))
}

/// Writes to DVD+R/RW media via `growisofs`.
pub struct DvdWriter {
    device: PathBuf,
    media: MediaDefinition,
    drive_speed: Option<u32>,
    runner: CommandRunner,
    core: WriterCore,
}

impl DvdWriter {
    /// Creates a writer for `device`, which must be one of the DVD media
    /// types.
    pub fn new(
        device: PathBuf,
        media_type: MediaType,
        drive_speed: Option<u32>,
        eject_enabled: bool,
        eject_delay_secs: u64,
        refresh_media_delay_secs: u64,
    ) -> Result<Self> {
        if !media_type.is_dvd() {
            return Err(CedarError::usage("DvdWriter requires a DVD media type"));
        }
        Ok(DvdWriter {
            device,
            media: MediaDefinition::for_type(media_type),
            drive_speed,
            runner: CommandRunner::new(),
            core: WriterCore::new(eject_enabled, eject_delay_secs, refresh_media_delay_secs),
        })
    }

    fn device_str(&self) -> String {
        self.device.to_string_lossy().into_owned()
    }

    /// Dry-run probe of sectors already used on the disc. A probe
    /// failure (unreadable/blank media) is treated as zero used, not as
    /// an error, since an unreadable disc is exactly the "nothing
    /// written yet" case from the writer's point of view.
    fn probe_sectors_used(&self) -> u64 {
        let device = self.device_str();
        match self.runner.run("growisofs", &["-dry-run", "-Z", &device, "/dev/null"], true) {
            Ok(out) => parse_sectors_used(&out.output).unwrap_or(0),
            Err(_) => 0,
        }
    }
}

impl OpticalWriter for DvdWriter {
    fn media(&self) -> &MediaDefinition {
        &self.media
    }

    fn state(&self) -> WriterState {
        self.core.state
    }

    fn initialize_image(&mut self, new_disc: bool, _tmp_dir: &Path, media_label: Option<&str>) -> Result<()> {
        self.core.initialize(new_disc);
        if let Some(label) = media_label {
            if let Ok(image) = self.core.image_mut() {
                image.volume_id = Some(label.to_string());
            }
        }
        Ok(())
    }

    fn add_image_entry(&mut self, path: &Path, graft_point: Option<&Path>) -> Result<()> {
        self.core.image_mut()?.add_entry(path, graft_point, false, false)?;
        self.core.mark_staged();
        Ok(())
    }

    fn set_image_new_disc(&mut self, new_disc: bool) -> Result<()> {
        self.core.require_initialized()?;
        self.core.new_disc = new_disc;
        Ok(())
    }

    fn get_estimated_image_size(&self) -> Result<u64> {
        self.core.image()?.get_estimated_size(&self.runner)
    }

    fn retrieve_capacity(&self, entire_disc: bool, _use_multi: bool) -> Result<MediaCapacity> {
        let sectors_used = if entire_disc { 0 } else { self.probe_sectors_used() };
        let available_sectors = self.media.capacity_sectors.saturating_sub(sectors_used);
        Ok(MediaCapacity {
            bytes_used: sectors_used * super::SECTOR_SIZE,
            bytes_available: (available_sectors * super::SECTOR_SIZE) as i64,
            boundaries: None,
        })
    }

    fn write_image(&mut self, image_path: Option<&Path>, new_disc: bool, write_multi: bool) -> Result<()> {
        self.set_image_new_disc(new_disc)?;

        let required = self.get_estimated_image_size().unwrap_or(0);
        let capacity = self.retrieve_capacity(false, write_multi)?;
        check_capacity(capacity.bytes_available, required)?;

        if new_disc {
            refresh_media(&self.runner, &self.device, &self.core)?;
        }

        let device = self.device_str();
        let mut args: Vec<String> = Vec::new();
        if let Some(speed) = self.drive_speed {
            args.push(format!("-speed={speed}"));
        }
        // growisofs reinitializes the disc as part of the same burn when
        // asked for a fresh session, so there is no separate blank step
        // the way there is on CD media.
        args.push(if new_disc { "-Z".to_string() } else { "-M".to_string() });

        let out = match image_path {
            Some(path) => {
                args.push(device.clone());
                args.push(path.to_string_lossy().into_owned());
                let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                self.runner.run("growisofs", &arg_refs, false)?
            }
            None => {
                let image = self.core.image()?;
                let mut full_args = args.clone();
                full_args.push(device.clone());
                full_args.extend(image_growisofs_args(image));
                let arg_refs: Vec<&str> = full_args.iter().map(String::as_str).collect();
                self.runner.run("growisofs", &arg_refs, false)?
            }
        };

        if !out.success() {
            if let Some((free, required)) = parse_overburn(&out.output) {
                return Err(CedarError::io(format!(
                    "not enough space on media: {} blocks free, {} required",
                    free, required
                )));
            }
            return Err(CedarError::io(format!("growisofs failed: {}", out.output)));
        }

        self.core.take_image()?;
        log::info!("Wrote DVD image to [{}].", self.device.display());
        Ok(())
    }
}

/// Builds the `mkisofs`-passthrough arguments growisofs expects after
/// `-Z device` / `-M device` when it is asked to build the image itself
/// rather than burn a pre-built `.iso` file. growisofs forwards anything
/// after the device argument straight to its embedded mkisofs, so the
/// arguments are identical to a standalone mkisofs invocation.
fn image_growisofs_args(image: &crate::iso::IsoImage) -> Vec<String> {
    image.mkisofs_passthrough_args()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seek_line_into_sectors() {
        assert_eq!(parse_sectors_used("builtin_dd: seek=894048\n"), Some(894048 * 16));
    }

    #[test]
    fn missing_seek_line_is_none() {
        assert_eq!(parse_sectors_used("nothing useful here\n"), None);
    }

    #[test]
    fn parses_overburn_scenario_from_spec() {
        let line = ":-( /usr/bin/growisofs: \"Current Write Speed\" is 4.0x1385KBps: 894048 blocks are free, 2033746 to be written!";
        let (free, required) = parse_overburn(line).unwrap();
        assert_eq!(free, 894048);
        assert_eq!(required, 2033746);
        // Matches the byte totals named in the spec's overburn scenario.
        assert_eq!(free * 2048, 894048 * 2048);
        assert_eq!(required * 2048, 2033746 * 2048);
    }

    #[test]
    fn non_overburn_output_has_no_match() {
        assert_eq!(parse_overburn("burn completed successfully"), None);
    }

    #[test]
    fn rejects_cd_media_type() {
        let result = DvdWriter::new(PathBuf::from("/dev/sr0"), MediaType::Cdr74, None, true, 1, 1);
        assert!(result.is_err());
    }

    #[test]
    fn retrieve_capacity_entire_disc_assumes_blank() {
        let writer = DvdWriter::new(PathBuf::from("/dev/sr0"), MediaType::DvdPlusR, None, true, 1, 1).unwrap();
        let capacity = writer.retrieve_capacity(true, false).unwrap();
        assert_eq!(capacity.bytes_used, 0);
        assert!(capacity.bytes_available > 0);
    }

    #[test]
    fn state_transitions_through_initialize_and_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = DvdWriter::new(PathBuf::from("/dev/sr0"), MediaType::DvdPlusRw, None, true, 1, 1).unwrap();
        assert_eq!(writer.state(), WriterState::Idle);
        writer.initialize_image(false, dir.path(), None).unwrap();
        assert_eq!(writer.state(), WriterState::ImageInitialized);

        let f = dir.path().join("a.txt");
        std::fs::write(&f, "x").unwrap();
        writer.add_image_entry(&f, None).unwrap();
        assert_eq!(writer.state(), WriterState::EntriesStaged);
    }
}
