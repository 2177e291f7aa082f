use proptest::prelude::*;
use tributary_engine::config::{parser, validator};
use tributary_types::LoadMode;

fn project_yaml(load_extra: &str) -> String {
    format!(
        r#"
version: "1.0"
project: prop_project
connections:
  - name: db
    type: sqlite
extracts:
  - name: numbers
    type: inline
    columns:
      - {{ name: n, type: integer }}
    rows:
      - [1]
transforms:
  - name: same
    source: extracts.numbers
    outputs:
      - {{ name: n }}
loads:
  - name: copy
    source: transforms.same
    connection: db{load_extra}
"#
    )
}

proptest! {
    #[test]
    fn window_end_must_not_precede_start(start in 1_u64..20, end in 1_u64..20) {
        let yaml = project_yaml(&format!("\n    start: {start}\n    end: {end}"));
        let config = parser::parse_project_str(&yaml).expect("generated yaml must parse");
        let result = validator::validate_project(&config);

        if end < start {
            prop_assert!(result.is_err());
        } else {
            prop_assert!(result.is_ok());
        }
    }

    #[test]
    fn only_known_load_modes_validate(mode in "[a-z]{3,9}") {
        let yaml = project_yaml(&format!("\n    mode: \"{mode}\""));
        let config = parser::parse_project_str(&yaml).expect("generated yaml must parse");
        let result = validator::validate_project(&config);
        let legal = LoadMode::ALL.iter().any(|m| m.as_str() == mode);

        prop_assert_eq!(result.is_ok(), legal);
    }

    #[test]
    fn bulk_size_must_be_positive(bulk_size in 0_usize..4) {
        let yaml = project_yaml(&format!("\n    bulk_size: {bulk_size}"));
        let config = parser::parse_project_str(&yaml).expect("generated yaml must parse");
        let result = validator::validate_project(&config);

        prop_assert_eq!(result.is_ok(), bulk_size > 0);
    }
}
