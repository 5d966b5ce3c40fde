use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use radnet::classifier::ClassifierTables;
use radnet::config::Config;
use radnet::netlist::{Kind, Netlist};
use radnet::parser::{ParseOptions, parse_file, parse_str};
use radnet::resolver::resolve;
use radnet::transform::{
    AlterationMode, InjectionScope, RadiationLibrary, TransformOptions, TransformationEngine,
};
use tempfile::TempDir;

const INVERTER_CHAIN: &str = r#"global 0 vdd
parameters vnom=1.2 len=60n
model nch bsim4 type=n
model pch bsim4 type=p
subckt inv (a y)
parameters w=1u
mp (y a vdd vdd) pch w=2*w l=len
mn (y a 0 0) nch w=w l=len
ends inv
x1 (in mid) inv
x2 (mid out) inv w=2u
v1 (vdd 0) vsource dc=vnom
if (vnom > 1) {
    r1 (out 0) resistor r=1k
} else {
    r2 (out 0) resistor r=2k
}
tran1 tran stop=10n
save out
"#;

// Helper function to create a temporary netlist file
fn create_test_file(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("top.scs");
    fs::write(&file_path, content).expect("Failed to write test file");
    (temp_dir, file_path)
}

// Helper function to run the radnet binary
fn run_radnet(args: Vec<&std::ffi::OsStr>) -> Result<std::process::Output, std::io::Error> {
    let mut cmd = Command::new("cargo");
    cmd.arg("run").arg("--");
    for arg in args {
        cmd.arg(arg);
    }
    cmd.output()
}

fn parse(text: &str, permissive: bool) -> radnet::error::Result<Netlist> {
    let mut tables = ClassifierTables::from_config(&Config::default())?;
    Ok(parse_str(text, Path::new("top.scs"), &mut tables, ParseOptions { permissive })?.netlist)
}

fn names(netlist: &Netlist, kind: Kind) -> Vec<String> {
    netlist
        .iter_kind(kind)
        .map(|id| netlist[id].name.to_string())
        .collect()
}

#[cfg(test)]
mod parse_export_tests {
    use super::*;

    /// Exported text parses back into the same statement tree
    #[test]
    fn test_export_round_trip() {
        let netlist = parse(INVERTER_CHAIN, false).expect("Failed to parse netlist");
        let exported = netlist.export();
        let reparsed = parse(&exported, false).expect("Failed to parse exported netlist");

        assert_eq!(netlist.outline(netlist.root()), reparsed.outline(reparsed.root()));
        assert_eq!(reparsed.export(), exported);
    }

    /// Backslash and plus continuations produce one statement
    #[test]
    fn test_continuation_lines_are_joined() {
        let netlist = parse(
            "r1 (a b) \\\n    resistor r=1k\nr2 (b c) resistor\n+ r=2k\n// r3 (c d) resistor\n",
            false,
        )
        .expect("Failed to parse netlist");

        assert_eq!(names(&netlist, Kind::Instance), vec!["r1", "r2"]);
        assert_eq!(
            netlist.export(),
            "r1 (a b) resistor r=1k\nr2 (b c) resistor r=2k\n"
        );
    }

    /// A subcircuit left open is fatal unless parsing permissively
    #[test]
    fn test_strict_and_permissive_unterminated_subcircuit() {
        let open = "subckt inv (a y)\nr1 (a y) resistor\n";
        let closed = "subckt inv (a y)\nr1 (a y) resistor\nends inv\n";

        assert!(parse(open, false).is_err());

        let permissive = parse(open, true).expect("Permissive parse should succeed");
        let reference = parse(closed, false).expect("Failed to parse closed netlist");
        assert_eq!(
            permissive.outline(permissive.root()),
            reference.outline(reference.root())
        );
    }

    /// Netlists pulled in by include keep their own circuit
    #[test]
    fn test_includes_are_parsed_relative_to_the_includer() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(temp_dir.path().join("lib")).expect("Failed to create lib dir");
        fs::write(
            temp_dir.path().join("lib").join("cells.scs"),
            "subckt inv (a y)\nr1 (a y) resistor\nends inv\n",
        )
        .expect("Failed to write include");
        let top = temp_dir.path().join("top.scs");
        fs::write(&top, "include \"lib/cells.scs\"\nx1 (p q) inv\n").expect("Failed to write top");

        let mut tables = ClassifierTables::from_config(&Config::default()).unwrap();
        let mut netlist = parse_file(&top, &mut tables, ParseOptions::default())
            .expect("Failed to parse netlist")
            .netlist;
        assert_eq!(netlist.circuits().count(), 2);

        let report = resolve(&mut netlist, &tables);
        assert!(report.unresolved.is_empty());
        let x1 = netlist.find(Kind::Instance, "x1").unwrap();
        let inv = netlist.find(Kind::Subcircuit, "inv").unwrap();
        assert_eq!(netlist[x1].dependency.global_parent, Some(inv));
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::*;

    fn engine_inputs(text: &str, config: &Config) -> (Netlist, ClassifierTables, RadiationLibrary) {
        let mut tables = ClassifierTables::from_config(config).unwrap();
        let library = RadiationLibrary::from_config(&config.radiation, &mut tables).unwrap();
        let mut golden = parse_str(text, Path::new("top.scs"), &mut tables, ParseOptions::default())
            .expect("Failed to parse netlist")
            .netlist;
        resolve(&mut golden, &tables);
        (golden, tables, library)
    }

    /// One injection scenario per alterable node of the top level
    #[test]
    fn test_injection_scenario_count() {
        let config = Config::from_yaml(
            "radiation:\n  injection:\n    definition: |\n      subckt set_src (inj ref)\n      i0 (inj ref) isource dc=1m\n      ends set_src\n    instance_prefix: set\n",
        )
        .expect("Failed to parse config");
        let (mut golden, tables, library) = engine_inputs(
            "v1 (vdd 0) vsource dc=1\nr1 (vdd a) resistor\nr2 (a b) resistor\nc1 (b 0) capacitor\n",
            &config,
        );
        let options = TransformOptions {
            mode: AlterationMode::Injection(InjectionScope::All),
            prune_analyses: false,
        };
        let generation = TransformationEngine::new(&tables, &library, options)
            .generate(&mut golden)
            .expect("Failed to generate scenarios");

        // vdd, a and b; ground is unalterable
        assert_eq!(generation.scenarios.len(), 3);
        for scenario in &generation.scenarios {
            let injectors = names(&scenario.netlist, Kind::Instance)
                .into_iter()
                .filter(|name| name.starts_with("set_"))
                .count();
            assert_eq!(injectors, 1, "{}", scenario.folder);
            assert!(scenario.export().contains("subckt set_src (inj ref)"));
        }
    }

    /// Altering a scenario leaves the golden netlist and the other scenarios intact
    #[test]
    fn test_scenarios_do_not_share_statements() {
        let config = Config::default();
        let (mut golden, tables, library) =
            engine_inputs("r1 (a b) resistor\nr2 (b 0) resistor\n", &config);
        let before = golden.export();

        let options = TransformOptions {
            mode: AlterationMode::Injection(InjectionScope::All),
            prune_analyses: false,
        };
        let mut generation = TransformationEngine::new(&tables, &library, options)
            .generate(&mut golden)
            .expect("Failed to generate scenarios");
        assert_eq!(generation.scenarios.len(), 2);

        let other = generation.scenarios[1].export();
        let first = &mut generation.scenarios[0].netlist;
        let r1 = first.find(Kind::Instance, "r1").unwrap();
        first[r1].master_name = "capacitor".into();

        assert_eq!(golden.export(), before);
        assert_eq!(generation.scenarios[1].export(), other);
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    /// inspect writes the golden export and the dependency graph
    #[test]
    fn test_inspect_writes_golden_and_dot() {
        let (temp_dir, input_path) = create_test_file(INVERTER_CHAIN);
        let golden_path = temp_dir.path().join("golden.scs");
        let dot_path = temp_dir.path().join("deps.dot");
        let report_path = temp_dir.path().join("inspect.rpt");

        let output = run_radnet(vec![
            "inspect".as_ref(),
            input_path.as_os_str(),
            "--golden".as_ref(),
            golden_path.as_os_str(),
            "--dot".as_ref(),
            dot_path.as_os_str(),
            "--ancestry".as_ref(),
            "-r".as_ref(),
            report_path.as_os_str(),
        ])
        .expect("Failed to run radnet");

        assert!(
            output.status.success(),
            "inspect failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let golden = fs::read_to_string(&golden_path).expect("Failed to read golden export");
        assert!(golden.contains("subckt inv (a y)"));
        assert!(golden.contains("x2 (mid out) inv w=2u"));

        let dot = fs::read_to_string(&dot_path).expect("Failed to read DOT file");
        assert!(dot.contains("digraph"));

        let report = fs::read_to_string(&report_path).expect("Failed to read report");
        assert!(report.contains("0 unresolved"));
        assert!(report.contains("top.x1"));
    }

    /// alter writes one folder per scenario
    #[test]
    fn test_alter_writes_scenario_folders() {
        let (temp_dir, input_path) =
            create_test_file("v1 (vdd 0) vsource dc=1\nr1 (vdd out) resistor\nc1 (out 0) capacitor\ntran1 tran stop=1n\ndc1 dc\n");
        let output_dir = temp_dir.path().join("scenarios");

        let output = run_radnet(vec![
            "alter".as_ref(),
            input_path.as_os_str(),
            "-o".as_ref(),
            output_dir.as_os_str(),
            "--prune-analyses".as_ref(),
        ])
        .expect("Failed to run radnet");

        assert!(
            output.status.success(),
            "alter failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        let mut folders: Vec<_> = fs::read_dir(&output_dir)
            .expect("Failed to list output")
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        folders.sort();
        assert_eq!(folders, vec!["1_inj_top_vdd", "2_inj_top_out"]);

        let scenario = fs::read_to_string(output_dir.join("2_inj_top_out").join("top.scs"))
            .expect("Failed to read scenario");
        assert!(scenario.contains("rad_inj_out (out 0) rad_pulse"));
        assert!(scenario.contains("tran1 tran stop=1n"));
        assert!(!scenario.contains("dc1"));

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("2 scenarios written"));
    }

    /// A missing input file is reported as a failure
    #[test]
    fn test_missing_input_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let missing = temp_dir.path().join("missing.scs");

        let output = run_radnet(vec!["inspect".as_ref(), missing.as_os_str()])
            .expect("Failed to run radnet");

        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("missing.scs"));
    }

    /// Listed-only injection is rejected in substitution mode
    #[test]
    fn test_listed_only_requires_injection() {
        let (temp_dir, input_path) = create_test_file("r1 (a 0) resistor\n");
        let output_dir = temp_dir.path().join("scenarios");

        let output = run_radnet(vec![
            "alter".as_ref(),
            input_path.as_os_str(),
            "-o".as_ref(),
            output_dir.as_os_str(),
            "--mode".as_ref(),
            "substitution".as_ref(),
            "--listed-only".as_ref(),
        ])
        .expect("Failed to run radnet");

        assert!(!output.status.success());
        assert!(!output_dir.exists());
    }
}
