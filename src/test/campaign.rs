// RPLA: Generation and Execution of RPL Attack Experiments on Simulated Sensor Networks
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Tests for whole campaigns.

use std::fs;

use serde_json::json;

use super::{Fixture, RecordingRunner};
use crate::{
    experiments::{get_experiments, make_all, prepare, rip_my_slip, run_all, CampaignError},
    template::MALICIOUS_SOURCE,
};

#[tokio::test]
async fn make_two_experiments() {
    let fixture = Fixture::new();
    let manifest = fixture.manifest(
        "campaign",
        json!({
            "exp1": {"target": "sky", "mtype": "1"},
            "exp2": {"target": "sky", "mtype": "2"},
        }),
    );
    let mut runner = RecordingRunner::new();
    let report = make_all(&fixture.config, &mut runner, &manifest)
        .await
        .unwrap();

    assert_eq!(report.made.len(), 2);
    assert!(report.skipped.is_empty());
    for name in ["exp1", "exp2"] {
        let path = fixture.config.experiment_folder(name);
        for dir in ["motes", "data", "results"] {
            assert!(path.join(dir).is_dir(), "{name}/{dir} is missing");
        }
    }
    assert!(!fixture.config.templates_folder().join(MALICIOUS_SOURCE).exists());
    fixture.assert_templates_pristine();

    // root and sensor are compiled once for the whole campaign
    let lines = runner.command_lines();
    assert_eq!(lines.iter().filter(|l| l.starts_with("make motes/root")).count(), 1);
    assert_eq!(lines.iter().filter(|l| l.starts_with("make motes/malicious")).count(), 2);
}

#[tokio::test]
async fn binaries_follow_network_size() {
    let fixture = Fixture::new();
    let manifest = fixture.manifest(
        "campaign",
        json!({
            "a": {"target": "sky", "n": 5},
            "b": {"target": "sky", "n": 5, "mtype": "2"},
            "c": {"target": "sky", "n": 50, "debug": true},
        }),
    );
    let mut runner = RecordingRunner::new();
    make_all(&fixture.config, &mut runner, &manifest)
        .await
        .unwrap();

    // `b` shares the sources of `a`, `c` does not
    let lines = runner.command_lines();
    assert_eq!(lines.iter().filter(|l| l.starts_with("make motes/root")).count(), 2);
    assert_eq!(lines.iter().filter(|l| l.starts_with("make motes/sensor")).count(), 2);
    for (name, routes) in [("a", 6), ("b", 6), ("c", 51)] {
        let conf = fs::read_to_string(
            fixture
                .config
                .experiment_folder(name)
                .join("motes/project-conf.h"),
        )
        .unwrap();
        assert!(conf.contains(&format!("#define UIP_CONF_MAX_ROUTES {routes}\n")), "{name}");
    }
}

#[tokio::test]
async fn invalid_names_are_skipped() {
    let fixture = Fixture::new();
    let manifest = fixture.manifest("campaign", json!({"../escape": {}, "good": {}}));
    let report = make_all(&fixture.config, &mut RecordingRunner::new(), &manifest)
        .await
        .unwrap();
    assert_eq!(report.made, vec!["good".to_string()]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "../escape");
    assert!(!fixture.root().join("escape").exists());
}

#[tokio::test]
async fn stale_experiments_are_replaced() {
    let fixture = Fixture::new();
    let stale = fixture.config.experiment_folder("exp1").join("results");
    fs::create_dir_all(&stale).unwrap();
    fs::write(stale.join("old.csv"), "stale").unwrap();

    let manifest = fixture.manifest("campaign", json!({"exp1": {}}));
    make_all(&fixture.config, &mut RecordingRunner::new(), &manifest)
        .await
        .unwrap();
    assert!(stale.is_dir());
    assert!(!stale.join("old.csv").exists());
}

#[tokio::test]
async fn every_entry_is_processed_once() {
    let fixture = Fixture::new();
    let entries: serde_json::Map<String, serde_json::Value> = (0..7)
        .map(|i| (format!("exp-{i}"), json!({"target": "z1", "mtype": (i % 3) + 1})))
        .collect();
    let manifest = fixture.manifest("many", serde_json::Value::Object(entries));

    let mut runner = RecordingRunner::new();
    let report = make_all(&fixture.config, &mut runner, &manifest)
        .await
        .unwrap();
    assert_eq!(report.made.len(), 7);

    let mut made = report.made.clone();
    made.sort();
    made.dedup();
    assert_eq!(made.len(), 7);
    assert_eq!(
        runner
            .command_lines()
            .iter()
            .filter(|l| l.starts_with("make motes/malicious"))
            .count(),
        7
    );
}

#[tokio::test]
async fn invalid_entries_are_skipped() {
    let fixture = Fixture::new();
    let manifest = fixture.manifest(
        "campaign",
        json!({
            "bad": {"target": "bogus"},
            "good": {"target": "wismote"},
        }),
    );
    let report = make_all(&fixture.config, &mut RecordingRunner::new(), &manifest)
        .await
        .unwrap();
    assert_eq!(report.made, vec!["good".to_string()]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "bad");
    assert!(!fixture.config.experiment_folder("bad").exists());
}

#[tokio::test]
async fn build_failure_stops_campaign() {
    let fixture = Fixture::new();
    let manifest = fixture.manifest("campaign", json!({"a": {}, "b": {}}));
    let mut runner = RecordingRunner::new().failing("ant jar");
    let err = make_all(&fixture.config, &mut runner, &manifest)
        .await
        .unwrap_err();
    assert!(matches!(err, CampaignError::Make { .. }));
    assert!(!fixture.config.experiment_folder("b").exists());
}

#[tokio::test]
async fn run_every_experiment() {
    let fixture = Fixture::new();
    let manifest = fixture.manifest("campaign", json!({"a": {}, "b": {}}));
    for name in ["a", "b"] {
        fs::create_dir_all(fixture.config.experiment_folder(name)).unwrap();
    }
    let mut runner = RecordingRunner::new();
    let done = run_all(&fixture.config, &mut runner, &manifest)
        .await
        .unwrap();
    assert_eq!(done.len(), 2);
    assert_eq!(runner.invocations.len(), 4);
}

#[tokio::test]
async fn prepare_and_rip() {
    let fixture = Fixture::new();
    let path = prepare(&fixture.config, "my_simulation").unwrap();
    assert_eq!(path, fixture.config.experiments_folder.join("my_simulation.json"));
    let manifest = get_experiments(&path).unwrap();
    assert!(!manifest.is_empty());

    assert!(matches!(
        prepare(&fixture.config, "my_simulation"),
        Err(CampaignError::AlreadyExists(_))
    ));

    let mut runner = RecordingRunner::new();
    let report = rip_my_slip(&fixture.config, &mut runner, "rpl-attacks")
        .await
        .unwrap();
    assert_eq!(report.made.len(), manifest.len());
    let runs = runner
        .command_lines()
        .iter()
        .filter(|l| l.starts_with("make run-with"))
        .count();
    assert_eq!(runs, manifest.len() * 2);
}
