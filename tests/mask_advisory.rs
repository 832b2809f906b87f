use log::Level;
use ndarray::array;
use rusterio::{backends::MemDataset, ColorRole, MaskOptions, RasterReader};

fn rgba() -> MemDataset {
    let mut dataset = MemDataset::from_array(array![
        [[10u8, 0], [10, 10]],
        [[20, 20], [0, 20]],
        [[30, 30], [30, 30]],
        [[255, 0], [255, 0]]
    ]);
    dataset.set_color_role(1, ColorRole::Red).unwrap();
    dataset.set_color_role(2, ColorRole::Green).unwrap();
    dataset.set_color_role(3, ColorRole::Blue).unwrap();
    dataset.set_alpha_band(4).unwrap();
    dataset
}

#[test]
fn read_masks_warns_when_nodata_shadows_alpha() {
    testing_logger::setup();
    let mut dataset = rgba();
    dataset.set_nodata(1, Some(0.)).unwrap();
    let mask = dataset.read_masks(1usize, &MaskOptions::default()).unwrap();
    assert_eq!(mask, array![[255u8, 0], [255, 255]].into_dyn());

    testing_logger::validate(|captured_logs| {
        let warnings: Vec<_> = captured_logs
            .iter()
            .filter(|log| log.level == Level::Warn)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].body.contains("alpha band"));
    });
}

#[test]
fn read_masks_is_quiet_with_alpha_alone() {
    testing_logger::setup();
    let dataset = rgba();
    dataset.read_masks([1usize, 4], &MaskOptions::default()).unwrap();

    testing_logger::validate(|captured_logs| {
        assert!(captured_logs.iter().all(|log| log.level != Level::Warn));
    });
}
