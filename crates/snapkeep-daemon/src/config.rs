use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ini::Ini;
use snapkeep_core::{
    parse_keep_age, FilterRule, IntervalClass, MountSpec, OverlapPolicy, PartitionSpec,
    ReadOnlyCompanion, Repository, SyncLogfileOptions,
};

use crate::errors::StartupError;

/// Parsed, validated contents of the configuration file. Built once at
/// startup; everything downstream (`Repository`, `MountSpec`) is derived
/// from this and never re-reads the file.
pub struct Config {
    pub logfile_path: PathBuf,
    pub loglevel: String,
    pub rsync_cmd: String,
    pub mounts: Vec<MountSpec>,
    pub repositories: Vec<Repository>,
}

/// One `[task]` section's keys, each resolved against `[default]` on a
/// per-key basis, not a whole-section override.
struct TaskSection<'a> {
    props: &'a ini::Properties,
    defaults: &'a ini::Properties,
}

impl<'a> TaskSection<'a> {
    fn get(&self, key: &str) -> Option<&'a str> {
        self.props.get(key).or_else(|| self.defaults.get(key))
    }

    fn get_all(&self, key: &str) -> Vec<String> {
        let own: Vec<String> = self.props.get_all(key).map(str::to_string).collect();
        if own.is_empty() {
            self.defaults.get_all(key).map(str::to_string).collect()
        } else {
            own
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => matches!(v, "true" | "yes" | "1"),
            None => default,
        }
    }

    /// Keys of the shape `<prefix>_<class>` carry one entry per interval
    /// class, since plain INI has no native nested-map syntax. This is the
    /// flat-key convention the `[task]` `interval`/`keep`/`keep_age` maps
    /// resolve to on disk.
    ///
    /// Returned in declaration order (task section first, then whatever
    /// `[default]` adds that the task didn't already declare) rather than
    /// sorted — class order is significant: it is the priority order
    /// `OverlapResolver` uses to break ties, so `rust-ini`'s own
    /// insertion-order iteration must be preserved, not discarded for a
    /// sorted map.
    fn class_suffixed(&self, prefix: &str) -> Vec<(String, String)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for section in [self.props, self.defaults] {
            for (key, value) in section.iter() {
                if let Some(class) = key.strip_prefix(prefix).and_then(|s| s.strip_prefix('_')) {
                    if seen.insert(class.to_string()) {
                        out.push((class.to_string(), value.to_string()));
                    }
                }
            }
        }
        out
    }
}

pub fn load(path: &Path) -> Result<Config, StartupError> {
    if !path.exists() {
        return Err(StartupError::ConfigFileNotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(StartupError::InvalidConfig(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    let ini = Ini::load_from_file(path)
        .map_err(|e| StartupError::InvalidConfig(e.to_string()))?;

    let logging = section(&ini, "logging")?;
    let logfile_path = PathBuf::from(required(logging, "logging", "logfile_path")?);
    let loglevel = required(logging, "logging", "loglevel")?.to_string();
    if !["quiet", "default", "verbose", "debug"].contains(&loglevel.as_str()) {
        return Err(StartupError::InvalidConfig(format!(
            "invalid loglevel \"{loglevel}\""
        )));
    }

    let rsync_cmd = ini
        .section(Some("rsync"))
        .and_then(|s| s.get("rsync_cmd"))
        .unwrap_or("rsync")
        .to_string();

    let mounts = ini
        .iter()
        .filter(|(name, _)| *name == Some("mount"))
        .map(|(_, props)| parse_mount(props))
        .collect::<Result<Vec<_>, _>>()?;

    let empty = ini::Properties::new();
    let defaults = ini.section(Some("default")).unwrap_or(&empty);

    let repositories = ini
        .iter()
        .filter(|(name, _)| *name == Some("task"))
        .filter_map(|(_, props)| {
            let task = TaskSection { props, defaults };
            match parse_task(&task) {
                Ok(repo) => Some(Ok(repo)),
                Err(StartupError::DestinationMissing(path)) => {
                    tracing::error!(destination = %path.display(), "destination does not exist, will not be created; skipping repository");
                    None
                }
                Err(e) => Some(Err(e)),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Config {
        logfile_path,
        loglevel,
        rsync_cmd,
        mounts,
        repositories,
    })
}

fn section<'a>(ini: &'a Ini, name: &str) -> Result<&'a ini::Properties, StartupError> {
    ini.section(Some(name))
        .ok_or_else(|| StartupError::MissingKey {
            section: name.to_string(),
            key: "<section>".to_string(),
        })
}

fn required<'a>(
    props: &'a ini::Properties,
    section: &str,
    key: &str,
) -> Result<&'a str, StartupError> {
    props.get(key).ok_or_else(|| StartupError::MissingKey {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn parse_mount(props: &ini::Properties) -> Result<MountSpec, StartupError> {
    let partition_raw = required(props, "mount", "partition")?;
    let partition = PartitionSpec::parse(partition_raw)
        .ok_or_else(|| StartupError::InvalidPartitionSpec(partition_raw.to_string()))?;

    let mountpoint = PathBuf::from(required(props, "mount", "mountpoint")?);
    let mountpoint_create = matches!(props.get("mountpoint_create"), Some("true" | "yes" | "1"));

    let mut options: Vec<String> = props
        .get("mountpoint_options")
        .map(|s| s.split(',').map(str::to_string).collect())
        .unwrap_or_default();
    options.push("rw".to_string());

    let readonly_companion = match props.get("mountpoint_ro") {
        None => None,
        Some(ro_path) => {
            let create = props.get("mountpoint_ro_create").ok_or(StartupError::NoMountpointCreate)?;
            let create = matches!(create, "true" | "yes" | "1");
            let mut ro_options: Vec<String> = props
                .get("mountpoint_ro_options")
                .map(|s| s.split(',').map(str::to_string).collect())
                .unwrap_or_default();
            ro_options.push("ro".to_string());
            Some(ReadOnlyCompanion {
                mountpoint: PathBuf::from(ro_path),
                create,
                options: ro_options,
            })
        }
    };

    Ok(MountSpec {
        partition,
        mountpoint,
        mountpoint_create,
        options,
        readonly_companion,
    })
}

fn parse_task(task: &TaskSection) -> Result<Repository, StartupError> {
    let task_name = task.get("taskname").ok_or_else(|| StartupError::MissingKey {
        section: "task".into(),
        key: "taskname".into(),
    })?;

    let destination = PathBuf::from(task.get("destination").ok_or_else(|| StartupError::MissingKey {
        section: "task".into(),
        key: "destination".into(),
    })?);
    let create_destination = task.get_bool("create_destination", false);

    if !destination.exists() {
        if !create_destination {
            return Err(StartupError::DestinationMissing(destination));
        }
    } else if !destination.is_dir() {
        return Err(StartupError::InvalidDestination(destination));
    }

    let sources: Vec<PathBuf> = task.get_all("source").into_iter().map(PathBuf::from).collect();
    if sources.is_empty() {
        return Err(StartupError::MissingKey {
            section: "task".into(),
            key: "source".into(),
        });
    }

    let schedules = task.class_suffixed("interval");
    let keeps = task.class_suffixed("keep");
    let keep_ages = task.class_suffixed("keep_age");

    let mut intervals = Vec::new();
    for (class, schedule) in schedules {
        let keep_raw = keeps.iter().find(|(c, _)| *c == class).map(|(_, v)| v.as_str());
        let keep_count = keep_raw
            .map(|v| {
                v.parse::<u32>().map_err(|_| {
                    StartupError::InvalidConfig(format!(
                        "invalid keep value \"{v}\" for interval class \"{class}\""
                    ))
                })
            })
            .transpose()?;

        let keep_age_raw = keep_ages.iter().find(|(c, _)| *c == class).map(|(_, v)| v.as_str());
        let keep_age = keep_age_raw
            .map(parse_keep_age)
            .transpose()
            .map_err(|e| StartupError::InvalidConfig(e.to_string()))?;

        if keep_count.is_none() && keep_age.is_none() {
            return Err(StartupError::InvalidConfig(format!(
                "interval class \"{class}\" has neither \"keep_{class}\" nor \"keep_age_{class}\" configured"
            )));
        }

        intervals.push(IntervalClass {
            name: class,
            schedule,
            keep_count,
            keep_age,
        });
    }

    let overlap_raw = task.get("overlapping").unwrap_or("single");
    let overlap_policy = OverlapPolicy::parse(overlap_raw)
        .ok_or_else(|| StartupError::InvalidConfig(format!("invalid overlapping value \"{overlap_raw}\"")))?;

    let mut filter_rules = Vec::new();
    for p in task.get_all("include_pattern") {
        filter_rules.push(FilterRule::Include(p));
    }
    for p in task.get_all("exclude_pattern") {
        filter_rules.push(FilterRule::Exclude(p));
    }
    for p in task.get_all("filter_pattern") {
        filter_rules.push(FilterRule::Filter(p));
    }
    for p in task.get_all("include_file") {
        let path = PathBuf::from(&p);
        if !path.exists() {
            return Err(StartupError::FilterFileNotFound(path));
        }
        if !path.is_file() {
            return Err(StartupError::FilterFileInvalid(path));
        }
        filter_rules.push(FilterRule::IncludeFile(path));
    }
    for p in task.get_all("exclude_file") {
        let path = PathBuf::from(&p);
        if !path.exists() {
            return Err(StartupError::FilterFileNotFound(path));
        }
        if !path.is_file() {
            return Err(StartupError::FilterFileInvalid(path));
        }
        filter_rules.push(FilterRule::ExcludeFile(path));
    }

    let one_file_system = task.get_bool("one_filesystem", false);

    let mut sync_args = Vec::new();
    for raw in task.get_all("rsync_args") {
        sync_args.extend(raw.split_whitespace().map(str::to_string));
    }
    if one_file_system {
        sync_args.push("-x".to_string());
    }

    let ssh_args = {
        let parts = task.get_all("ssh_args");
        if parts.is_empty() {
            None
        } else {
            Some(parts)
        }
    };
    if let Some(ssh) = &ssh_args {
        sync_args.push("--rsh".to_string());
        sync_args.push(ssh.join(" "));
    }

    let rsync_logfile = if task.get_bool("rsync_logfile", false) {
        Some(SyncLogfileOptions {
            name_template: task.get("rsync_logfile_name").unwrap_or("%t.log").to_string(),
            format: task.get("rsync_logfile_format").map(str::to_string),
        })
    } else {
        None
    };

    Ok(Repository {
        task_name: task_name.to_string(),
        destination,
        sources,
        intervals,
        filter_rules,
        sync_args,
        ssh_args,
        one_file_system,
        overlap_policy,
        rsync_logfile,
        create_destination,
    })
}
