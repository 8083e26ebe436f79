use pitch::config::PitchConfig;
use pitch::correlate::{CorrelationPolicy, correlate};
use pitch::hammerer::{HammerDriver, verify_translation};
use pitch::memory::{DRAMAddr, MemConfiguration, independent_functions};
use pitch::pattern::{
    AggressorTuple, Frequency, PatternShape, ShapeGenerator, bind_address, bind_phase,
};
use pitch::util::Rng;
use pitch::Campaign;
use pitch_dummy::Dummy;

const CONFIG_FILE: &str = "config/pitch-config.json";

fn load() -> anyhow::Result<(PitchConfig, MemConfiguration)> {
    let config = PitchConfig::from_jsonfile(CONFIG_FILE)?;
    let mem_config = config.mem_config()?;
    Ok((config, mem_config))
}

#[test]
fn test_shipped_platform() -> anyhow::Result<()> {
    let (_, mem_config) = load()?;
    assert_eq!(mem_config.get_bank_count(), 64);
    assert_eq!(mem_config.get_row_count(), 2048);
    assert_eq!(mem_config.get_col_count(), 8192);
    assert_eq!(DRAMAddr::new(0, 0, 0).to_phys(&mem_config), 0);
    let mut rng = Rng::from_seed(42);
    let driver = Dummy::new(mem_config, 0);
    verify_translation(&driver, &mem_config, &mut rng, 10_000)?;
    Ok(())
}

#[test]
fn test_redundant_functions_reduced() {
    let fns = [0x4080, 0x88000, 0x4080 ^ 0x88000, 0x110000, 0x4080];
    assert_eq!(independent_functions(&fns), vec![0x4080, 0x88000, 0x110000]);
}

/// Shape → phase → instance → signal → dummy hammer → scan → correlate, by hand.
#[test]
fn test_pipeline_by_hand() -> anyhow::Result<()> {
    let (config, mem_config) = load()?;
    let params = config.params;
    let tuple = AggressorTuple::new(vec![0, 2])?;
    let shape = PatternShape::new(4, 170, tuple, 8, Frequency::from_tenths(43))?;
    let phased = bind_phase(&shape, shape.max_phase())?;
    let instance = bind_address(&phased, DRAMAddr::new(3, 200, 0), mem_config.get_row_count())?;

    let mut driver = Dummy::new(mem_config, 7).with_threshold(1000);
    driver.init()?;
    let mut rng = Rng::from_seed(7);
    let outcome = instance.hammer(&mut driver, &params, &mut rng)?;
    assert!(outcome.rounds >= 1);
    assert_eq!(outcome.signal.len(), shape.period());
    assert_eq!(driver.requests().len(), 1);

    let located = outcome.flips;
    assert!(!located.is_empty());
    let correlation = correlate(
        &[instance.aggressors().to_vec()],
        &located,
        CorrelationPolicy::default(),
    );
    assert_eq!(correlation.attached.len(), located.len());
    for attachment in &correlation.attached {
        let dram = attachment.flip.dram.unwrap();
        assert_eq!(dram.bank, 3);
        assert!((195..=207).contains(&dram.row));
    }
    Ok(())
}

#[test]
fn test_generated_shapes_hammer() -> anyhow::Result<()> {
    let (config, mem_config) = load()?;
    let generator = ShapeGenerator::new(config.params, AggressorTuple::new(vec![0, 2])?)?;
    let mut rng = Rng::from_seed(11);
    let mut driver = Dummy::new(mem_config, 11);
    driver.init()?;
    for shape in generator.generate_many(20, &mut rng) {
        let phased = bind_phase(&shape, 0)?;
        let instance = bind_address(&phased, DRAMAddr::new(0, 100, 0), 2048)?;
        let outcome = instance.hammer(&mut driver, &config.params, &mut rng)?;
        assert_eq!(outcome.signal.len(), shape.period());
        assert_eq!(outcome.sync_addr, DRAMAddr::new(0, 110, 0).to_phys(&mem_config));
    }
    Ok(())
}

#[test]
fn test_campaign_on_dummy() -> anyhow::Result<()> {
    let (mut config, mem_config) = load()?;
    config.campaign.shapes = 3;
    config.campaign.phases = 2;
    config.campaign.instances = 2;
    config.campaign.seed = Some(0x1234);
    let mut driver = Dummy::new(mem_config, 0x1234);
    driver.init()?;
    let mut campaign = Campaign::builder()
        .driver(driver)
        .params(config.params)
        .config(config.campaign)
        .build()?;
    let records = campaign.run();
    assert_eq!(records.len(), 12);
    assert!(records.iter().all(|r| r.error.is_none()));
    assert!(records.iter().all(|r| r.aggressors == vec![0, 2]));
    assert!(records.iter().all(|r| r.mapping.len() == 2));
    assert_eq!(campaign.driver().requests().len(), 12);
    Ok(())
}

#[test]
fn test_campaign_reproducible() -> anyhow::Result<()> {
    let (mut config, mem_config) = load()?;
    config.campaign.shapes = 2;
    config.campaign.phases = 2;
    config.campaign.instances = 1;
    config.campaign.seed = Some(99);
    let run = |config: PitchConfig| -> anyhow::Result<Vec<(u32, usize, usize)>> {
        let mut driver = Dummy::new(mem_config, 1);
        driver.init()?;
        let mut campaign = Campaign::builder()
            .driver(driver)
            .params(config.params)
            .config(config.campaign)
            .build()?;
        Ok(campaign
            .run()
            .into_iter()
            .map(|r| (r.uid, r.period, r.phase))
            .collect())
    };
    assert_eq!(run(config.clone())?, run(config)?);
    Ok(())
}

#[test]
#[ignore = "requires 1 GiB hugepages and x86_64 hardware"]
fn test_campaign_on_hammerlib() -> anyhow::Result<()> {
    use pitch_hammerlib::HammerLib;
    let (mut config, mem_config) = load()?;
    config.campaign.shapes = 1;
    config.campaign.phases = 1;
    config.campaign.instances = 1;
    let mut driver = HammerLib::new(mem_config, 0);
    driver.init()?;
    let mut campaign = Campaign::builder()
        .driver(driver)
        .params(config.params)
        .config(config.campaign)
        .build()?;
    let records = campaign.run();
    assert_eq!(records.len(), 1);
    assert!(records[0].error.is_none());
    Ok(())
}
