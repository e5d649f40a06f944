use omnipd::export::{self, ExportFormat, FitReport};
use omnipd::fitting::{fit_observations, FitOptions};
use omnipd::import::ImportManager;
use omnipd::observations::load_observations_csv;
use omnipd::power_curve::MmpExtractor;
use omnipd::{calculate_omnipd_model, OmniPdError, OmniPdParams};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

/// Integration tests that exercise the complete import -> extract -> fit workflow

const BLOCKS: [u32; 10] = [5, 15, 30, 60, 180, 300, 600, 1200, 2400, 3600];

fn athlete() -> OmniPdParams {
    OmniPdParams::new(260.0, 22_000.0, 1100.0, 35.0)
}

/// One activity per block: easy riding around a maximal effort of `block` seconds
fn write_block_activity(dir: &Path, block: u32, params: &OmniPdParams) {
    let target = params.power_at(block as f64).unwrap().round() as u32;
    let mut file = std::fs::File::create(dir.join(format!("block_{:04}.csv", block))).unwrap();
    writeln!(file, "time,power,heart_rate").unwrap();

    let mut t = 0;
    for (seconds, watts) in [(120, 100), (block, target), (120, 100)] {
        for _ in 0..seconds {
            writeln!(file, "{},{},{}", t, watts, 140).unwrap();
            t += 1;
        }
    }
}

#[test]
fn test_directory_to_model_workflow() {
    let dir = tempdir().unwrap();
    let truth = athlete();
    for block in BLOCKS {
        write_block_activity(dir.path(), block, &truth);
    }

    let outcome = ImportManager::new().import_directory(dir.path(), false).unwrap();
    assert!(outcome.is_fully_successful());
    assert_eq!(outcome.activities.len(), BLOCKS.len());

    let efforts = MmpExtractor::with_durations(BLOCKS.to_vec()).extract_best(&outcome.activities);
    assert_eq!(efforts.len(), BLOCKS.len());
    for (obs, block) in efforts.observations().iter().zip(BLOCKS) {
        let expected = truth.power_at(block as f64).unwrap();
        assert!((obs.power - expected).abs() <= 0.5, "{} s: {}", block, obs.power);
    }

    let fit = fit_observations(efforts.observations(), &FitOptions::default()).unwrap();
    assert!((fit.params.cp - truth.cp).abs() < 3.0, "cp {}", fit.params.cp);
    assert!(fit.rmse < 1.0, "rmse {}", fit.rmse);
    assert!(fit.r_squared.unwrap() > 0.999);
}

#[test]
fn test_observation_csv_to_report() {
    let dir = tempdir().unwrap();
    let csv_path = dir.path().join("efforts.csv");
    std::fs::write(
        &csv_path,
        "Duration,Watts\n5s,1027\n1:00,587\n3:00,384\n5:00,333\n20:00,279\n1:00:00,247\n5:00,329\n",
    )
    .unwrap();

    let efforts = load_observations_csv(&csv_path).unwrap();
    // The duplicated 5:00 effort keeps the higher power
    assert_eq!(efforts.len(), 6);
    assert_eq!(efforts.powers()[3], 333.0);

    let fit = fit_observations(efforts.observations(), &FitOptions::default()).unwrap();
    assert!(fit.params.validate().is_ok());
    assert!(fit.params.cp > 240.0 && fit.params.cp < 280.0, "cp {}", fit.params.cp);

    let report = FitReport::from_fit(&fit, &[60, 300, 1200], Some(70.0))
        .unwrap()
        .with_source(csv_path.display().to_string());
    let json_path = dir.path().join("report.json");
    export::export_report(&report, ExportFormat::Json, &json_path).unwrap();

    let loaded = export::json::load_report(&json_path).unwrap();
    assert_eq!(loaded.params, fit.params);
    let predicted = loaded.params.power_at(300.0).unwrap();
    assert!((predicted - report.curve[1].power).abs() < 1e-9);
}

#[test]
fn test_errors_convert_to_top_level() {
    let err: OmniPdError = calculate_omnipd_model(&[60.0, 300.0], &[500.0, 350.0])
        .unwrap_err()
        .into();
    assert!(err.user_message().contains("2 given"));

    let err = ImportManager::new()
        .import_file(Path::new("missing_ride.fit"))
        .unwrap_err();
    let top = err.downcast_ref::<omnipd::error::ImportError>().unwrap();
    assert!(matches!(top, omnipd::error::ImportError::FileNotFound { .. }));
}
