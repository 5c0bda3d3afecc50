//! Pre-build structural validation against on-disk fixtures.

use contribkit_core::fixtures::ContributionFixture;
use contribkit_core::{
    ContributionDescriptor, ContributionId, FailReason, LayoutConfig, Stage,
    StructuralValidator, ValidationOutcome,
};

fn validate(fixture: &ContributionFixture) -> ValidationOutcome {
    validate_as(fixture, fixture.id())
}

fn validate_as(fixture: &ContributionFixture, id: ContributionId) -> ValidationOutcome {
    let root = tempfile::tempdir().unwrap();
    let dir = fixture.write(root.path()).unwrap();
    let layout = LayoutConfig::default();
    let descriptor = ContributionDescriptor::from_dir(&dir, id, &layout);
    StructuralValidator::new(layout).validate_pre(&descriptor)
}

fn assert_fails(outcome: &ValidationOutcome, reason: FailReason, needle: &str) {
    assert_eq!(outcome.stage, Stage::StructuralPre);
    let (actual, detail) = outcome
        .failure()
        .unwrap_or_else(|| panic!("expected {reason}, got pass"));
    assert_eq!(actual, reason, "detail: {detail}");
    assert!(
        detail.contains(needle),
        "detail {detail:?} should mention {needle:?}"
    );
}

#[test]
fn test_well_formed_contribution_passes() {
    let outcome = validate(&ContributionFixture::new("gravity_density"));
    assert!(outcome.is_pass(), "{outcome:?}");
}

#[test]
fn test_well_formed_native_contribution_passes() {
    let outcome = validate(&ContributionFixture::new("xray_tomography").native());
    assert!(outcome.is_pass(), "{outcome:?}");
}

#[test]
fn test_missing_metadata_file() {
    let outcome = validate(&ContributionFixture::new("alpha").without("contribution.toml"));
    assert_fails(&outcome, FailReason::MissingFile, "contribution.toml");
}

#[test]
fn test_missing_entry_module() {
    let outcome = validate(&ContributionFixture::new("alpha").without("__init__.py"));
    assert_fails(&outcome, FailReason::MissingFile, "__init__.py");
}

#[test]
fn test_missing_data_directory() {
    let outcome = validate(&ContributionFixture::new("alpha").without("data"));
    assert_fails(&outcome, FailReason::MissingFile, "directory `data`");
}

#[test]
fn test_missing_readme() {
    let outcome = validate(&ContributionFixture::new("alpha").without("README.md"));
    assert_fails(&outcome, FailReason::MissingFile, "README.md");
}

#[test]
fn test_unparsable_metadata() {
    let outcome = validate(&ContributionFixture::new("alpha").metadata("name = [unterminated"));
    assert_fails(&outcome, FailReason::InvalidMetadata, "contribution.toml");
}

#[test]
fn test_metadata_missing_required_field() {
    let fixture = ContributionFixture::new("alpha");
    let text = fixture
        .metadata_text()
        .replace("short_description = \"Fixture contribution alpha\"\n", "");
    let outcome = validate(&fixture.metadata(&text));
    assert_fails(&outcome, FailReason::InvalidMetadata, "short_description");
}

#[test]
fn test_native_flag_without_descriptor() {
    let outcome = validate(&ContributionFixture::new("alpha").native().without("CMakeLists.txt"));
    assert_fails(&outcome, FailReason::MissingFile, "CMakeLists.txt");
}

#[test]
fn test_descriptor_without_native_flag() {
    let outcome = validate(
        &ContributionFixture::new("alpha").file("CMakeLists.txt", "project(alpha)\n"),
    );
    assert_fails(&outcome, FailReason::InvalidMetadata, "native_extension");
}

#[test]
fn test_symbol_module_missing() {
    let outcome = validate(&ContributionFixture::new("alpha").without("alpha.py"));
    assert_fails(&outcome, FailReason::DanglingExampleReference, "module `alpha`");
}

#[test]
fn test_symbol_method_missing() {
    let outcome = validate(&ContributionFixture::new("alpha").file(
        "alpha.py",
        "class Alpha:\n    def inverse(self, data):\n        return data\n",
    ));
    assert_fails(&outcome, FailReason::DanglingExampleReference, "`forward`");
}

#[test]
fn test_example_input_missing() {
    let outcome = validate(&ContributionFixture::new("alpha").without("data/basic.txt"));
    assert_fails(&outcome, FailReason::DanglingExampleReference, "data/basic.txt");
}

#[test]
fn test_example_input_escaping_folder() {
    let fixture = ContributionFixture::new("alpha");
    let text = fixture
        .metadata_text()
        .replace("data/basic.txt", "../secrets.txt");
    let outcome = validate(&fixture.metadata(&text));
    assert_fails(&outcome, FailReason::DanglingExampleReference, "outside");
}

#[test]
fn test_metadata_name_mismatch() {
    let fixture = ContributionFixture::new("alpha");
    let text = fixture
        .metadata_text()
        .replace("name = \"alpha\"", "name = \"alpha_v2\"");
    let outcome = validate(&fixture.metadata(&text));
    assert_fails(&outcome, FailReason::NamingMismatch, "alpha_v2");
}

#[test]
fn test_class_name_mismatch() {
    let fixture = ContributionFixture::new("gravity_density");
    let text = fixture
        .metadata_text()
        .replace("class_name = \"GravityDensity\"", "class_name = \"Gravity\"");
    let outcome = validate(&fixture.metadata(&text));
    assert_fails(&outcome, FailReason::NamingMismatch, "GravityDensity");
}

#[test]
fn test_folder_not_snake_case() {
    let fixture = ContributionFixture::new("BadName");
    let outcome = validate(&fixture);
    assert_fails(&outcome, FailReason::NamingMismatch, "snake_case");
}

#[test]
fn test_checks_stop_at_first_failure() {
    // Missing README and a broken metadata file: the file check runs first.
    let outcome = validate(
        &ContributionFixture::new("alpha")
            .without("README.md")
            .metadata("not toml at all ["),
    );
    assert_fails(&outcome, FailReason::MissingFile, "README.md");
}

#[test]
fn test_extra_required_files_follow_layout() {
    let root = tempfile::tempdir().unwrap();
    let fixture = ContributionFixture::new("alpha");
    let dir = fixture.write(root.path()).unwrap();
    let layout = LayoutConfig {
        extra_required: vec!["README.md".to_string(), "LICENCE".to_string()],
        ..LayoutConfig::default()
    };
    let descriptor = ContributionDescriptor::from_dir(&dir, fixture.id(), &layout);
    let outcome = StructuralValidator::new(layout).validate_pre(&descriptor);
    assert_fails(&outcome, FailReason::MissingFile, "LICENCE");
}

#[test]
fn test_validation_never_writes_into_folder() {
    let root = tempfile::tempdir().unwrap();
    let fixture = ContributionFixture::new("alpha");
    let dir = fixture.write(root.path()).unwrap();
    let before = contribkit_core::source_digest(&dir).unwrap();

    let layout = LayoutConfig::default();
    let descriptor = ContributionDescriptor::from_dir(&dir, fixture.id(), &layout);
    let _ = StructuralValidator::new(layout).validate_pre(&descriptor);

    assert_eq!(before, contribkit_core::source_digest(&dir).unwrap());
}
