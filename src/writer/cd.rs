//! CD-R/RW writer, backed by `cdrecord`/`wodim` for burning and
//! `mkisofs`/`genisoimage` (via [`IsoImage`]) for building the image file.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::command::CommandRunner;
use crate::config::MediaType;
use crate::error::{CedarError, Result};

use super::{check_capacity, refresh_media, MediaCapacity, MediaDefinition, OpticalWriter, WriterCore, WriterState};

/// Capability flags parsed from `cdrecord -checkdrive` output (spec §6
/// "Probing external tools"). Any line not present in the output simply
/// leaves its flag at its default (`false`/`None`).
#[derive(Debug, Clone, Default)]
pub struct CdCapabilities {
    /// `Device type` line, verbatim.
    pub device_type: Option<String>,
    /// `Vendor_info` line, verbatim.
    pub vendor_info: Option<String>,
    /// `Identifikation` line, verbatim.
    pub identification: Option<String>,
    /// `Buffer size in KB`.
    pub buffer_size_kb: Option<u64>,
    /// `Does read multi-session`.
    pub supports_multi_session: bool,
    /// `Loading mechanism type: tray`.
    pub has_tray: bool,
    /// `Does support ejection`.
    pub supports_eject: bool,
}

/// Parses `cdrecord -checkdrive` capability output.
pub fn parse_capabilities(output: &str) -> CdCapabilities {
    let mut caps = CdCapabilities::default();

    for line in output.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Device type:") {
            caps.device_type = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Vendor_info:") {
            caps.vendor_info = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Identifikation:") {
            caps.identification = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Buffer size in KB:") {
            caps.buffer_size_kb = value.trim().parse().ok();
        } else if line.contains("Does read multi-session") {
            caps.supports_multi_session = true;
        } else if line.contains("Loading mechanism type: tray") {
            caps.has_tray = true;
        } else if line.contains("Does support ejection") {
            caps.supports_eject = true;
        }
    }

    caps
}

/// Parses the single-line `cdrecord -msinfo` output (`lower, upper`,
/// whitespace tolerant). Empty output means the disc is uninitialized.
/// Per the spec's open question, only the first line is consulted.
pub fn parse_boundaries(output: &str) -> Option<(u64, u64)> {
    let first_line = output.lines().find(|l| !l.trim().is_empty())?;
    let re = Regex::new(r"^\s*(\d+)\s*,\s*(\d+)\s*$").expect("static regex");
    let caps = re.captures(first_line)?;
    let lower: u64 = caps.get(1)?.as_str().parse().ok()?;
    let upper: u64 = caps.get(2)?.as_str().parse().ok()?;
    Some((lower, upper))
}

/// Writes to CD-R/RW media via `cdrecord`.
pub struct CdWriter {
    device: PathBuf,
    media: MediaDefinition,
    scsi_id: Option<String>,
    drive_speed: Option<u32>,
    runner: CommandRunner,
    core: WriterCore,
}

impl CdWriter {
    /// Creates a writer for `device`, which must be one of the CD media
    /// types.
    pub fn new(
        device: PathBuf,
        media_type: MediaType,
        scsi_id: Option<String>,
        drive_speed: Option<u32>,
        eject_enabled: bool,
        eject_delay_secs: u64,
        refresh_media_delay_secs: u64,
    ) -> Result<Self> {
        if media_type.is_dvd() {
            return Err(CedarError::usage("CdWriter requires a CD media type"));
        }
        Ok(CdWriter {
            device,
            media: MediaDefinition::for_type(media_type),
            scsi_id,
            drive_speed,
            runner: CommandRunner::new(),
            core: WriterCore::new(eject_enabled, eject_delay_secs, refresh_media_delay_secs),
        })
    }

    fn device_arg(&self) -> String {
        match &self.scsi_id {
            Some(id) => format!("dev={id}"),
            None => format!("dev={}", self.device.display()),
        }
    }

    fn probe_capabilities(&self) -> Result<CdCapabilities> {
        let out = self.runner.run("cdrecord", &["-checkdrive", &self.device_arg()], true)?;
        Ok(parse_capabilities(&out.output))
    }

    fn probe_boundaries(&self) -> Option<(u64, u64)> {
        let out = self.runner.run("cdrecord", &["-msinfo", &self.device_arg()], true).ok()?;
        if !out.success() {
            return None;
        }
        parse_boundaries(&out.output)
    }

    fn full_disc_capacity(&self) -> MediaCapacity {
        let available_sectors = self
            .media
            .capacity_sectors
            .saturating_sub(self.media.initial_lead_in_sectors);
        MediaCapacity {
            bytes_used: 0,
            bytes_available: (available_sectors * super::SECTOR_SIZE) as i64,
            boundaries: None,
        }
    }
}

impl OpticalWriter for CdWriter {
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

    fn retrieve_capacity(&self, entire_disc: bool, use_multi: bool) -> Result<MediaCapacity> {
        if entire_disc {
            return Ok(self.full_disc_capacity());
        }

        let capabilities = self.probe_capabilities()?;
        if !use_multi || !capabilities.supports_multi_session {
            return Ok(self.full_disc_capacity());
        }

        match self.probe_boundaries() {
            None => Ok(self.full_disc_capacity()),
            Some((lower, upper)) => {
                let available_sectors = self
                    .media
                    .capacity_sectors
                    .saturating_sub(upper)
                    .saturating_sub(self.media.per_session_lead_in_sectors);
                Ok(MediaCapacity {
                    bytes_used: upper * super::SECTOR_SIZE,
                    bytes_available: (available_sectors * super::SECTOR_SIZE) as i64,
                    boundaries: Some((lower, upper)),
                })
            }
        }
    }

    fn write_image(&mut self, image_path: Option<&Path>, new_disc: bool, write_multi: bool) -> Result<()> {
        self.set_image_new_disc(new_disc)?;

        // Probe capacity/boundaries before building the image, mirroring the
        // original's `IsoImage(device, capacity.boundaries)` construction:
        // an entire-disc probe (new disc) never yields boundaries, and a
        // non-multi write drops any boundaries found so the image is built
        // as a fresh session rather than an append.
        let capacity = self.retrieve_capacity(new_disc, write_multi)?;
        let boundaries = if write_multi { capacity.boundaries } else { None };
        self.core.image_mut()?.append = boundaries.map(|b| (self.device.clone(), b));

        let tmp_iso;
        let iso_path: &Path = match image_path {
            Some(path) => path,
            None => {
                let tmp_dir = std::env::temp_dir();
                tmp_iso = tmp_dir.join(format!("cedar-backup-{}.iso", std::process::id()));
                self.core.image()?.write_image(&self.runner, &tmp_iso)?;
                &tmp_iso
            }
        };

        let required = self.get_estimated_image_size().unwrap_or(0);
        check_capacity(capacity.bytes_available, required)?;

        if new_disc && self.media.rewritable {
            let device_arg = self.device_arg();
            let blank_out = self.runner.run("cdrecord", &["blank=fast", &device_arg], false)?;
            if !blank_out.success() {
                return Err(CedarError::io(format!("failed to blank media: {}", blank_out.output)));
            }
            refresh_media(&self.runner, &self.device, &self.core)?;
        }

        let device_arg = self.device_arg();
        let path_arg = iso_path.to_string_lossy().into_owned();
        let mut args: Vec<String> = vec![device_arg];
        if let Some(speed) = self.drive_speed {
            args.push(format!("speed={speed}"));
        }
        if write_multi {
            args.push("-multi".to_string());
        }
        args.push("-data".to_string());
        args.push(path_arg);

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.runner.run("cdrecord", &arg_refs, false)?;
        if !out.success() {
            return Err(CedarError::io(format!("cdrecord failed: {}", out.output)));
        }

        self.core.take_image()?;
        log::info!("Wrote CD image to [{}].", self.device.display());
        Ok(())
    }
}
