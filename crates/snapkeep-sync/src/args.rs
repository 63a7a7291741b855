use std::path::Path;

use snapkeep_core::{rules_to_args, BackupParams};

/// Expand `params` plus one concrete `source` into the sync tool's argv:
/// archive semantics, an optional `--link-dest`, filter rules in
/// declaration order, then whatever extra flags the task config carried
/// (one-file-system and remote-shell args are folded into
/// `params.sync_args` at config-resolution time), then an optional log
/// file, and finally the source/destination pair.
pub fn build_args(params: &BackupParams, source: &Path) -> Vec<String> {
    let mut args = vec!["-a".to_string()];

    if let Some(link_ref) = &params.link_ref_folder {
        let link_dest = params.destination_dir.join(link_ref);
        args.push(format!("--link-dest={}", link_dest.display()));
    }

    args.extend(rules_to_args(&params.filter_rules));
    args.extend(params.sync_args.iter().cloned());

    if let Some(logfile) = &params.sync_logfile {
        args.push(format!("--log-file={}", logfile.name_template));
        if let Some(format) = &logfile.format {
            args.push(format!("--log-file-format={format}"));
        }
    }

    let destination = params.destination_dir.join(&params.folder_name);
    args.push(source.display().to_string());
    args.push(destination.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapkeep_core::{FilterRule, SyncLogfileOptions};
    use std::path::PathBuf;

    fn base_params() -> BackupParams {
        BackupParams {
            sources: vec![PathBuf::from("/src")],
            destination_dir: PathBuf::from("/repo"),
            folder_name: "t_daily_2024-01-01T00-00-00".into(),
            link_ref_folder: None,
            filter_rules: Vec::new(),
            sync_args: Vec::new(),
            sync_logfile: None,
        }
    }

    #[test]
    fn minimal_args_are_archive_plus_paths() {
        let params = base_params();
        let args = build_args(&params, Path::new("/src"));
        assert_eq!(
            args,
            vec![
                "-a".to_string(),
                "/src".to_string(),
                "/repo/t_daily_2024-01-01T00-00-00".to_string(),
            ]
        );
    }

    #[test]
    fn link_dest_points_at_the_prior_snapshot() {
        let mut params = base_params();
        params.link_ref_folder = Some("t_daily_2023-12-31T00-00-00".into());
        let args = build_args(&params, Path::new("/src"));
        assert_eq!(args[1], "--link-dest=/repo/t_daily_2023-12-31T00-00-00");
    }

    #[test]
    fn filter_rules_precede_extra_sync_args() {
        let mut params = base_params();
        params.filter_rules = vec![FilterRule::Exclude("*.tmp".into())];
        params.sync_args = vec!["-x".to_string()];
        let args = build_args(&params, Path::new("/src"));
        let exclude_idx = args.iter().position(|a| a == "--exclude=*.tmp").unwrap();
        let x_idx = args.iter().position(|a| a == "-x").unwrap();
        assert!(exclude_idx < x_idx);
    }

    #[test]
    fn logfile_options_are_appended_before_paths() {
        let mut params = base_params();
        params.sync_logfile = Some(SyncLogfileOptions {
            name_template: "/var/log/snapkeep/%Y.log".into(),
            format: Some("%t %f".into()),
        });
        let args = build_args(&params, Path::new("/src"));
        assert!(args.contains(&"--log-file=/var/log/snapkeep/%Y.log".to_string()));
        assert!(args.contains(&"--log-file-format=%t %f".to_string()));
        assert_eq!(args[args.len() - 2], "/src".to_string());
    }
}
