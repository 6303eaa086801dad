//! End-to-end runs through the scenario pipeline.

use std::fs;

use ipnet::Ipv4Net;
use segnet::ip::overlaps;
use segnet::output::{DirectorySink, MemorySink};
use segnet::platform::{PlatformEvent, RecordingPlatform};
use segnet::scenario::{RunOutcome, RunSettings, ScenarioKind, ScenarioOptions, Session};
use segnet::topology::{self, Shape, SwitchConfig, TopologyPlan};
use tempfile::TempDir;

fn run_once(kind: ScenarioKind, session: &mut Session, id: &str) -> (RunOutcome, RecordingPlatform) {
    let mut platform = RecordingPlatform::new();
    let mut sink = MemorySink::new();
    let outcome = kind
        .run(
            &ScenarioOptions::default(),
            session,
            Some(id),
            &mut platform,
            &mut sink,
            &RunSettings::default(),
        )
        .unwrap();
    (outcome, platform)
}

#[test]
fn test_path_of_five_switches() {
    let mut plan = TopologyPlan::default();
    let (switches, links) = topology::build(&mut plan, 5, &Shape::Path, |_| SwitchConfig::default()).unwrap();

    assert_eq!(switches.len(), 5);
    assert_eq!(links.len(), 4);
    for (i, id) in links.iter().enumerate() {
        let link = plan.link(*id).unwrap();
        assert_eq!(link.left.node, format!("s{}", i));
        assert_eq!(link.right.node, format!("s{}", i + 1));
    }
}

#[test]
fn test_every_scenario_is_reproducible() {
    for kind in ScenarioKind::all() {
        let (a, platform_a) = run_once(kind, &mut Session::new(), "1001");
        let (b, platform_b) = run_once(kind, &mut Session::new(), "1001");

        assert_eq!(
            serde_json::to_string(&a.plan).unwrap(),
            serde_json::to_string(&b.plan).unwrap(),
            "{} topology differs",
            kind
        );
        assert_eq!(a.commands, b.commands, "{} commands differ", kind);
        assert_eq!(a.questions, b.questions, "{} answers differ", kind);
        assert_eq!(platform_a.events(), platform_b.events());
    }
}

#[test]
fn test_batch_never_reuses_address_space() {
    let mut session = Session::new();
    let mut networks: Vec<(String, Ipv4Net)> = Vec::new();
    for kind in ScenarioKind::all() {
        for id in ["1", "2"] {
            let (outcome, _) = run_once(kind, &mut session, id);
            for net in outcome.plan.networks() {
                networks.push((format!("{}-{}", kind, id), *net));
            }
        }
    }

    for (i, (owner, a)) in networks.iter().enumerate() {
        for (other, b) in &networks[i + 1..] {
            assert!(!overlaps(a, b), "{} ({}) overlaps {} ({})", a, owner, b, other);
        }
    }
}

#[test]
fn test_every_host_is_started_after_its_switches() {
    for kind in ScenarioKind::all() {
        let (outcome, platform) = run_once(kind, &mut Session::new(), "7");
        let events = platform.events();
        let last_switch = events
            .iter()
            .rposition(|e| matches!(e, PlatformEvent::StartSwitch { .. }))
            .unwrap();
        let first_host = events
            .iter()
            .position(|e| matches!(e, PlatformEvent::StartHost { .. }))
            .unwrap();
        assert!(last_switch < first_host, "{}", kind);

        let started = events
            .iter()
            .filter(|e| matches!(e, PlatformEvent::StartHost { .. }))
            .count();
        assert_eq!(started, outcome.plan.hosts().len());
    }
}

#[test]
fn test_documents_written_for_teacher_and_student() {
    let root = TempDir::new().unwrap();
    let mut session = Session::new();
    let mut platform = RecordingPlatform::new();
    let mut sink = DirectorySink::new(root.path().join("student"), root.path().join("teacher"));

    let outcome = ScenarioKind::SpanningTree
        .run(
            &ScenarioOptions::default(),
            &mut session,
            Some("42"),
            &mut platform,
            &mut sink,
            &RunSettings::default(),
        )
        .unwrap();

    assert_eq!(outcome.seed, "42");
    assert!(outcome.persisted.iter().all(|p| p.exists()));

    let answers = fs::read_to_string(root.path().join("teacher/Spanning Tree-42.yaml")).unwrap();
    assert!(answers.contains("Rapid Spanning Tree Protocol (RSTP)"));

    let task = fs::read_to_string(root.path().join("student/Spanning Tree.yaml")).unwrap();
    assert!(task.contains("1. How many switches form the loop?"));
    assert!(!task.contains("RSTP)"));

    let topology: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.path().join("teacher/Spanning Tree-42.topology.json")).unwrap())
            .unwrap();
    assert_eq!(topology["switches"].as_array().unwrap().len(), 3);
}

#[test]
fn test_vlan_range_option_uses_session_pool() {
    let mut session = Session::new();
    let mut platform = RecordingPlatform::new();
    let mut sink = MemorySink::new();
    let options: ScenarioOptions = serde_yaml::from_str("vlan_range: full\nvlan_count: 4").unwrap();

    ScenarioKind::VlanTrunking
        .run(&options, &mut session, Some("9"), &mut platform, &mut sink, &RunSettings::default())
        .unwrap();

    assert_eq!(session.vlans().capacity(), 4093);
    assert_eq!(session.vlans().remaining(), 4093 - 4);
}
