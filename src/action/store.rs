//! The `store`/`rebuild` actions: burn staged backup content to optical
//! media, optionally verifying the write by mounting the disc back and
//! comparing digests.

use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use cedar_fs::BackupFileList;

use crate::config::{Config, MediaConfig, OptionsConfig, StoreConfig};
use crate::error::{CedarError, Result};
use crate::indicator::{self, STAGE_INDICATOR, STORE_INDICATOR};
use crate::platform::Platform;
use crate::writer::cd::CdWriter;
use crate::writer::dvd::DvdWriter;
use crate::writer::{blank_safe_new_disc, OpticalWriter};

use super::{dated_path, resolve_ownership, today_is_start_of_week};

fn build_writer(media: &MediaConfig) -> Result<Box<dyn OpticalWriter>> {
    if media.media_type.is_dvd() {
        Ok(Box::new(DvdWriter::new(
            media.device_path.clone(),
            media.media_type,
            media.drive_speed,
            media.eject_enabled,
            media.eject_delay_secs,
            media.refresh_media_delay_secs,
        )?))
    } else {
        Ok(Box::new(CdWriter::new(
            media.device_path.clone(),
            media.media_type,
            media.scsi_id.clone(),
            media.drive_speed,
            media.eject_enabled,
            media.eject_delay_secs,
            media.refresh_media_delay_secs,
        )?))
    }
}

/// `_findCorrectDailyDir`: picks the single staging directory `store`
/// processes.
pub(crate) fn find_correct_daily_dir(
    source_dir: &Path,
    today: NaiveDate,
    full: bool,
    warn_midnite: bool,
) -> Result<PathBuf> {
    let today_dir = dated_path(source_dir, today);

    if full {
        if today_dir.exists() && indicator::exists(&today_dir, None, STAGE_INDICATOR) {
            return Ok(today_dir);
        }
        return Err(CedarError::io(
            "store --full: today's staging directory was not found or has not been staged",
        ));
    }

    let yesterday = dated_path(source_dir, today - ChronoDuration::days(1));
    let tomorrow = dated_path(source_dir, today + ChronoDuration::days(1));

    for (dir, is_today) in [(today_dir, true), (yesterday, false), (tomorrow, false)] {
        if dir.exists()
            && indicator::exists(&dir, None, STAGE_INDICATOR)
            && !indicator::exists(&dir, None, STORE_INDICATOR)
        {
            if !is_today && warn_midnite {
                log::warn!("Selected non-today staging directory [{}] (cross-midnight).", dir.display());
            }
            return Ok(dir);
        }
    }

    Err(CedarError::io(
        "store: no staging directory (today, yesterday, or tomorrow) is eligible",
    ))
}

/// `_findRebuildDirs`: picks every staging directory since the configured
/// start-of-week day that is still staged.
pub(crate) fn find_rebuild_dirs(source_dir: &Path, today: NaiveDate, start_day: u8) -> Result<Vec<PathBuf>> {
    let w = today.weekday().num_days_from_monday() as i64;
    let start = start_day as i64;
    let days = if w >= start { w - start + 1 } else { 7 - (start - w) + 1 };

    let mut dirs = Vec::new();
    for i in 0..days {
        let date = today - ChronoDuration::days(i);
        let dir = dated_path(source_dir, date);
        if dir.exists() && indicator::exists(&dir, None, STAGE_INDICATOR) {
            dirs.push(dir);
        }
    }

    if dirs.is_empty() {
        return Err(CedarError::usage(
            "rebuild: no staged staging directories found for the current week",
        ));
    }
    Ok(dirs)
}

fn mounted_path(mountpoint: &Path, graft_point: Option<&Path>) -> PathBuf {
    match graft_point {
        Some(p) => mountpoint.join(p),
        None => mountpoint.to_path_buf(),
    }
}

/// Mounts the device, compares each `(staging_dir, graft_point)` pair's
/// digest map against the corresponding path on the mounted disc, then
/// unmounts (retrying up to 5 times at 1-second intervals, since the
/// device can stay briefly busy right after a write).
fn check_data(
    device: &Path,
    working_dir: &Path,
    entries: &[(PathBuf, Option<PathBuf>)],
    platform: &dyn Platform,
) -> Result<()> {
    let mountpoint = working_dir.join("cback-mnt");
    std::fs::create_dir_all(&mountpoint)
        .map_err(|e| CedarError::io(format!("failed to create mountpoint [{}]: {e}", mountpoint.display())))?;

    platform.mount(device, &mountpoint)?;

    let result = (|| -> Result<()> {
        for (staging_dir, graft_point) in entries {
            let mut staged = BackupFileList::new();
            staged.add_dir_contents(staging_dir, true, false, 0, false)?;
            let staged_digest = staged.generate_digest_map(Some(staging_dir))?;

            let mounted_dir = mounted_path(&mountpoint, graft_point.as_deref());
            let mut on_disc = BackupFileList::new();
            on_disc.add_dir_contents(&mounted_dir, true, false, 0, false)?;
            let disc_digest = on_disc.generate_digest_map(Some(&mounted_dir))?;

            if staged_digest != disc_digest {
                return Err(CedarError::io(format!(
                    "data written to [{}] does not match staged directory [{}]",
                    mounted_dir.display(),
                    staging_dir.display()
                )));
            }
        }
        Ok(())
    })();

    let mut attempts = 0;
    loop {
        match platform.unmount(&mountpoint) {
            Ok(()) => break,
            Err(e) => {
                attempts += 1;
                if attempts >= 5 {
                    log::error!("Failed to unmount [{}] after 5 attempts: {e}", mountpoint.display());
                    break;
                }
                sleep(Duration::from_secs(1));
            }
        }
    }

    result
}

fn write_entries(
    writer: &mut dyn OpticalWriter,
    working_dir: &Path,
    entries: &[(PathBuf, Option<PathBuf>)],
    new_disc: bool,
    write_multi: bool,
) -> Result<()> {
    writer.initialize_image(new_disc, working_dir, None)?;
    for (path, graft_point) in entries {
        writer.add_image_entry(path, graft_point.as_deref())?;
    }
    writer.write_image(None, new_disc, write_multi)?;
    Ok(())
}

/// Runs the `store` action for `today`: selects the single eligible
/// staging directory, burns it, optionally verifies it, and writes the
/// store indicator.
pub fn execute_store(config: &Config, options: &OptionsConfig, platform: &dyn Platform, today: NaiveDate) -> Result<()> {
    let store: &StoreConfig = config
        .store
        .as_ref()
        .ok_or_else(|| CedarError::usage("store: no [store] configuration section present"))?;

    let dir = find_correct_daily_dir(&store.source_dir, today, options.full, store.warn_midnite)?;
    let ownership = resolve_ownership(config, platform)?;
    let today_is_start = today_is_start_of_week(config, today);

    let mut writer = build_writer(&store.media)?;
    let entries = vec![(dir.clone(), None)];

    let working_dir = config
        .working_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);

    writer.initialize_image(false, &working_dir, None)?;
    writer.add_image_entry(&dir, None)?;
    let required = writer.get_estimated_image_size().unwrap_or(0) as f64;
    let capacity = writer.retrieve_capacity(false, true)?;
    let new_disc = blank_safe_new_disc(
        false,
        today_is_start,
        store.blank_behavior,
        capacity.bytes_available as f64,
        required,
    );

    writer.write_image(None, new_disc, true)?;

    if store.check_data {
        check_data(&store.media.device_path, &working_dir, &entries, platform)?;
    }

    indicator::write(&dir, None, STORE_INDICATOR, Some(platform), ownership)?;
    log::info!("Executed store successfully for [{}].", dir.display());
    Ok(())
}

/// Runs the `rebuild` action for `today`: collects every still-staged
/// directory since the configured start-of-week day, burns them all onto
/// a freshly blanked disc, and writes a store indicator in each.
pub fn execute_rebuild(config: &Config, platform: &dyn Platform, today: NaiveDate) -> Result<()> {
    let store: &StoreConfig = config
        .store
        .as_ref()
        .ok_or_else(|| CedarError::usage("rebuild: no [store] configuration section present"))?;

    let dirs = find_rebuild_dirs(&store.source_dir, today, store.start_day)?;
    let ownership = resolve_ownership(config, platform)?;

    let working_dir = config
        .working_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);

    let entries: Vec<(PathBuf, Option<PathBuf>)> = dirs
        .iter()
        .map(|dir| {
            let relative = dir
                .strip_prefix(&store.source_dir)
                .unwrap_or(dir)
                .to_path_buf();
            (dir.clone(), Some(relative))
        })
        .collect();

    let mut writer = build_writer(&store.media)?;
    write_entries(writer.as_mut(), &working_dir, &entries, true, false)?;

    if store.check_data {
        check_data(&store.media.device_path, &working_dir, &entries, platform)?;
    }

    for dir in &dirs {
        indicator::write(dir, None, STORE_INDICATOR, Some(platform), ownership)?;
    }

    log::info!("Executed rebuild successfully for {} staging director{}.", dirs.len(), if dirs.len() == 1 { "y" } else { "ies" });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn full_run_requires_todays_directory_staged() {
        let root = tempfile::tempdir().unwrap();
        let today = date(2005, 2, 9);
        let dir = dated_path(root.path(), today);
        std::fs::create_dir_all(&dir).unwrap();
        indicator::write(&dir, None, STAGE_INDICATOR, None, None).unwrap();

        let found = find_correct_daily_dir(root.path(), today, true, false).unwrap();
        assert_eq!(found, dir);
    }

    #[test]
    fn full_run_fails_when_today_not_staged() {
        let root = tempfile::tempdir().unwrap();
        let today = date(2005, 2, 9);
        assert!(find_correct_daily_dir(root.path(), today, true, false).is_err());
    }

    #[test]
    fn span_midnight_falls_back_to_yesterday() {
        let root = tempfile::tempdir().unwrap();
        let today = date(2005, 2, 10);
        let yesterday_dir = dated_path(root.path(), date(2005, 2, 9));
        std::fs::create_dir_all(&yesterday_dir).unwrap();
        indicator::write(&yesterday_dir, None, STAGE_INDICATOR, None, None).unwrap();

        let found = find_correct_daily_dir(root.path(), today, false, true).unwrap();
        assert_eq!(found, yesterday_dir);
    }

    #[test]
    fn already_stored_directory_is_not_reselected() {
        let root = tempfile::tempdir().unwrap();
        let today = date(2005, 2, 9);
        let dir = dated_path(root.path(), today);
        std::fs::create_dir_all(&dir).unwrap();
        indicator::write(&dir, None, STAGE_INDICATOR, None, None).unwrap();
        indicator::write(&dir, None, STORE_INDICATOR, None, None).unwrap();

        assert!(find_correct_daily_dir(root.path(), today, false, false).is_err());
    }

    #[test]
    fn rebuild_collects_days_since_start_of_week() {
        let root = tempfile::tempdir().unwrap();
        // Wednesday 2026-08-05, start_day = 0 (Monday) -> 3 days: Wed, Tue, Mon.
        let today = date(2026, 8, 5);
        for offset in 0..3 {
            let dir = dated_path(root.path(), today - ChronoDuration::days(offset));
            std::fs::create_dir_all(&dir).unwrap();
            indicator::write(&dir, None, STAGE_INDICATOR, None, None).unwrap();
        }

        let dirs = find_rebuild_dirs(root.path(), today, 0).unwrap();
        assert_eq!(dirs.len(), 3);
    }

    #[test]
    fn rebuild_fails_when_nothing_staged() {
        let root = tempfile::tempdir().unwrap();
        let today = date(2026, 8, 5);
        assert!(find_rebuild_dirs(root.path(), today, 0).is_err());
    }
}
