use std::path::Path;

use conductor_e2e::config::RunConfig;
use conductor_e2e::TestSpec;

#[test]
fn bundled_specs_parse_and_split_across_projects() {
    let specs = TestSpec::load_all(Path::new("specs")).unwrap();
    assert!(specs.len() >= 3);

    let config = RunConfig::default();
    let cases: Vec<_> = specs.into_iter().map(TestSpec::into_case).collect();
    for case in &cases {
        let projects: Vec<_> = config
            .projects
            .iter()
            .filter(|p| p.matches(case.title(), &case.tag_set()))
            .collect();
        assert_eq!(projects.len(), 1, "{} must belong to exactly one project", case.title());
    }
    assert!(cases.iter().any(|c| c.tag_set().needs_db_reset()));
}

#[test]
fn workflow_fixture_carries_expected_tags() {
    let raw = std::fs::read_to_string("fixtures/Test_workflow_1.json").unwrap();
    let workflow: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let tags: Vec<_> = workflow["tags"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(tags, vec!["some-tag-1", "some-tag-2"]);
}
