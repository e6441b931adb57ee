//! `OpticalWriter`: the abstract contract realized by [`cd::CdWriter`] and
//! [`dvd::DvdWriter`], plus the media geometry and capacity types and the
//! blank-safe/tray-handshake policy both realizations share.

pub mod cd;
pub mod dvd;

use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use crate::command::CommandRunner;
use crate::config::{BlankBehavior, BlankMode, MediaType};
use crate::error::{CedarError, Result};
use crate::iso::IsoImage;

/// 1 ISO 9660 sector, in bytes.
pub const SECTOR_SIZE: u64 = 2048;

/// Static geometry for one optical media family.
#[derive(Debug, Clone, Copy)]
pub struct MediaDefinition {
    /// Media family this definition describes.
    pub media_type: MediaType,
    /// Whether the media can be blanked and rewritten.
    pub rewritable: bool,
    /// Usable capacity, in 2048-byte sectors.
    pub capacity_sectors: u64,
    /// Lead-in reserved on a fresh disc (CD only).
    pub initial_lead_in_sectors: u64,
    /// Lead-in reserved per appended session (CD only).
    pub per_session_lead_in_sectors: u64,
}

impl MediaDefinition {
    /// Looks up the static geometry for `media_type`.
    pub fn for_type(media_type: MediaType) -> MediaDefinition {
        const MB: u64 = 1024 * 1024;
        const GB: u64 = 1000 * 1000 * 1000; // DVD capacities are "true" (decimal) GB.

        match media_type {
            MediaType::Cdr74 | MediaType::Cdrw74 => MediaDefinition {
                media_type,
                rewritable: media_type == MediaType::Cdrw74,
                capacity_sectors: (650 * MB) / SECTOR_SIZE,
                initial_lead_in_sectors: 11_400,
                per_session_lead_in_sectors: 6_900,
            },
            MediaType::Cdr80 | MediaType::Cdrw80 => MediaDefinition {
                media_type,
                rewritable: media_type == MediaType::Cdrw80,
                capacity_sectors: (700 * MB) / SECTOR_SIZE,
                initial_lead_in_sectors: 11_400,
                per_session_lead_in_sectors: 6_900,
            },
            MediaType::DvdPlusR | MediaType::DvdPlusRw => MediaDefinition {
                media_type,
                rewritable: media_type == MediaType::DvdPlusRw,
                capacity_sectors: (44 * GB / 10) / SECTOR_SIZE,
                initial_lead_in_sectors: 0,
                per_session_lead_in_sectors: 0,
            },
        }
    }
}

/// A `(start, end)` pair of sector counts describing used/available
/// space on the current media.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaCapacity {
    /// Bytes already used.
    pub bytes_used: u64,
    /// Bytes still available. May be reported as `<= 0` when the disc is
    /// effectively full.
    pub bytes_available: i64,
    /// Multisession boundaries, CD only.
    pub boundaries: Option<(u64, u64)>,
}

impl MediaCapacity {
    /// `used / (used + available)`, clamped into `[0, 100]`.
    pub fn utilization(&self) -> f64 {
        if self.bytes_available <= 0 {
            return 100.0;
        }
        if self.bytes_used == 0 {
            return 0.0;
        }
        let total = self.bytes_used as f64 + self.bytes_available as f64;
        ((self.bytes_used as f64 / total) * 100.0).clamp(0.0, 100.0)
    }
}

/// State machine governing one write: `initialize_image` moves
/// `Idle` -> `ImageInitialized`; entry-taking calls require
/// `ImageInitialized` or later; `write_image` consumes the image and
/// returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// No image in progress.
    Idle,
    /// `initialize_image` has run; entries may be added.
    ImageInitialized,
    /// At least one entry has been staged.
    EntriesStaged,
    /// The image has been written to media.
    Written,
}

/// The optical-writer contract, realized by a CD writer and a DVD writer.
pub trait OpticalWriter {
    /// Static geometry of the media this writer targets.
    fn media(&self) -> &MediaDefinition;

    /// Current writer state.
    fn state(&self) -> WriterState;

    /// Begins a new image, optionally with a disc label. Resets any
    /// previously in-flight image.
    fn initialize_image(&mut self, new_disc: bool, tmp_dir: &Path, media_label: Option<&str>) -> Result<()>;

    /// Stages one path into the in-flight image. Requires
    /// `ImageInitialized` or later.
    fn add_image_entry(&mut self, path: &Path, graft_point: Option<&Path>) -> Result<()>;

    /// Overrides the new-disc flag computed at `initialize_image` time.
    fn set_image_new_disc(&mut self, new_disc: bool) -> Result<()>;

    /// Runs the image tool in estimate mode and returns the projected
    /// size in bytes.
    fn get_estimated_image_size(&self) -> Result<u64>;

    /// Probes the device for its currently used/available capacity.
    fn retrieve_capacity(&self, entire_disc: bool, use_multi: bool) -> Result<MediaCapacity>;

    /// Writes the in-flight (or externally supplied) image to the
    /// device, blanking first if required. Consumes the image and
    /// returns to `Idle`.
    fn write_image(&mut self, image_path: Option<&Path>, new_disc: bool, write_multi: bool) -> Result<()>;
}

/// Shared book-keeping used by both writer realizations: the in-flight
/// image, write state, and tray/eject configuration.
#[derive(Debug)]
pub(crate) struct WriterCore {
    pub state: WriterState,
    pub image: Option<IsoImage>,
    pub new_disc: bool,
    pub eject_enabled: bool,
    pub eject_delay: Duration,
    pub refresh_media_delay: Duration,
}

impl WriterCore {
    pub fn new(eject_enabled: bool, eject_delay_secs: u64, refresh_media_delay_secs: u64) -> Self {
        WriterCore {
            state: WriterState::Idle,
            image: None,
            new_disc: false,
            eject_enabled,
            eject_delay: Duration::from_secs(eject_delay_secs),
            refresh_media_delay: Duration::from_secs(refresh_media_delay_secs),
        }
    }

    pub fn initialize(&mut self, new_disc: bool) {
        self.state = WriterState::ImageInitialized;
        self.image = Some(IsoImage::new());
        self.new_disc = new_disc;
    }

    pub fn require_initialized(&self) -> Result<()> {
        match self.state {
            WriterState::Idle => Err(CedarError::usage(
                "writer method called before initialize_image",
            )),
            _ => Ok(()),
        }
    }

    pub fn image_mut(&mut self) -> Result<&mut IsoImage> {
        self.require_initialized()?;
        self.image
            .as_mut()
            .ok_or_else(|| CedarError::usage("no image in progress"))
    }

    pub fn image(&self) -> Result<&IsoImage> {
        self.require_initialized()?;
        self.image.as_ref().ok_or_else(|| CedarError::usage("no image in progress"))
    }

    pub fn mark_staged(&mut self) {
        if self.state == WriterState::ImageInitialized {
            self.state = WriterState::EntriesStaged;
        }
    }

    pub fn take_image(&mut self) -> Result<IsoImage> {
        self.require_initialized()?;
        self.state = WriterState::Written;
        let image = self.image.take();
        self.state = WriterState::Idle;
        image.ok_or_else(|| CedarError::usage("no image in progress"))
    }
}

/// Implements the `writeImageBlankSafe` decision (spec §4.4): whether the
/// upcoming write should blank-and-rewrite the whole disc rather than
/// append a new session.
pub fn blank_safe_new_disc(
    rebuild_media: bool,
    today_is_start: bool,
    blank_behavior: Option<BlankBehavior>,
    bytes_available: f64,
    bytes_required: f64,
) -> bool {
    if rebuild_media {
        return true;
    }

    let Some(behavior) = blank_behavior else {
        return today_is_start;
    };

    let runs_today = behavior.mode == BlankMode::Daily || (behavior.mode == BlankMode::Weekly && today_is_start);
    if !runs_today {
        return false;
    }

    let ratio = bytes_available / (1.0 + bytes_required);
    ratio <= behavior.factor
}

/// Checks the image fits before writing, per spec's overburn guard.
pub fn check_capacity(bytes_available: i64, bytes_required: u64) -> Result<()> {
    if bytes_required as i64 > bytes_available {
        return Err(CedarError::io(
            "media does not contain enough capacity to hold this image".to_string(),
        ));
    }
    Ok(())
}

/// Opens, closes, and unlocks the tray (the "refresh media" handshake),
/// so a drive that locked itself after the previous write releases the
/// disc. A no-op if `eject_enabled` is false. Retries once with
/// `eject -i off` if the initial eject fails.
pub fn refresh_media(runner: &CommandRunner, device: &Path, core: &WriterCore) -> Result<()> {
    if !core.eject_enabled {
        return Ok(());
    }

    let device_str = device.to_string_lossy().into_owned();

    let open = runner.run("eject", &[&device_str], false)?;
    if !open.success() {
        log::warn!("Tray open failed for [{}], retrying after unlock.", device.display());
        runner.run("eject", &["-i", "off", &device_str], false)?;
        let retry = runner.run("eject", &[&device_str], false)?;
        if !retry.success() {
            return Err(CedarError::io(format!(
                "failed to open tray for [{}] after unlock retry",
                device.display()
            )));
        }
    }

    sleep(core.eject_delay);

    runner.run("eject", &["-t", &device_str], false)?;
    runner.run("eject", &["-i", "off", &device_str], false)?;

    sleep(core.refresh_media_delay);

    Ok(())
}
