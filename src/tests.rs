use super::*;
use crate::model::{build_dependency_graph, collect_species_refs, falling_factorial};
use crate::tree::{PropensityTree, select_linear};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn birth_death_model() -> Model {
    let mut builder = Model::builder();
    let x = builder.species("X");
    builder.channel(Channel::mass_action(5.0, &[], &[(x, 1)]));
    builder.channel(Channel::mass_action(1.0, &[(x, 1)], &[]));
    builder.build().unwrap()
}

fn death_only_model() -> Model {
    Model::from_stoichiometry(1, &[-1], &[1.0]).unwrap()
}

fn inert_model() -> Model {
    let mut builder = Model::builder();
    let x = builder.species("X");
    builder.channel(Channel::mass_action(0.0, &[], &[(x, 1)]));
    builder.build().unwrap()
}

fn saturating_expression_model() -> Model {
    let mut builder = Model::builder();
    builder.anonymous_species(2);
    let specs: [(&str, &[(usize, u32)], &[(usize, u32)]); 4] = [
        ("50.0 * (1.0 - s0)", &[], &[(0, 1)]),
        ("0.0", &[(0, 1)], &[]),
        ("50.0 * (1.0 - s1) * s0", &[], &[(1, 1)]),
        ("50.0 * s1 * (1.0 - s0)", &[(1, 1)], &[]),
    ];
    for (expr, reactants, products) in specs {
        builder.channel(Channel::expression(expr, reactants, products).unwrap());
    }
    builder.build().unwrap()
}

fn options(t_max: f64) -> SimulationOptions {
    SimulationOptions::with_horizon(t_max)
}

fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

#[test]
fn falling_factorial_basics() {
    assert_eq!(falling_factorial(5, 0), 1.0);
    assert_eq!(falling_factorial(5, 1), 5.0);
    assert_eq!(falling_factorial(5, 2), 20.0);
    assert_eq!(falling_factorial(6, 3), 120.0);
    assert_eq!(falling_factorial(3, 4), 0.0);
}

#[test]
fn derive_seed_is_deterministic() {
    assert_eq!(derive_seed(42, 5), derive_seed(42, 5));
    assert_ne!(derive_seed(42, 5), derive_seed(42, 6));
    assert_ne!(derive_seed(42, 5), derive_seed(43, 5));
}

#[test]
fn mass_action_is_zero_without_enough_reactants() {
    let dimerize = Channel::mass_action(0.5, &[(0, 2)], &[(1, 1)]);
    assert_eq!(dimerize.evaluate(&[1, 0]), 0.0);
    assert_eq!(dimerize.evaluate(&[3, 0]), 3.0);
    assert_eq!(
        dimerize.deltas(),
        &[
            SpeciesDelta {
                species: 0,
                delta: -2
            },
            SpeciesDelta {
                species: 1,
                delta: 1
            },
        ]
    );
}

#[test]
fn catalyst_has_no_net_delta() {
    // M + P -> 2P
    let autocatalysis = Channel::mass_action(0.01, &[(0, 1), (1, 1)], &[(1, 2)]);
    assert_eq!(
        autocatalysis.deltas(),
        &[
            SpeciesDelta {
                species: 0,
                delta: -1
            },
            SpeciesDelta {
                species: 1,
                delta: 1
            },
        ]
    );
    assert!((autocatalysis.evaluate(&[50, 2]) - 1.0).abs() < 1e-12);
    assert_eq!(autocatalysis.evaluate(&[50, 0]), 0.0);
}

#[test]
fn michaelis_menten_propensity_behaves() {
    let channel = Channel::michaelis_menten(8.0, 0, 4.0, &[(0, 1)], &[]).unwrap();
    assert!((channel.evaluate(&[6]) - 8.0 * 6.0 / (4.0 + 6.0)).abs() < 1e-12);
    assert!(Channel::michaelis_menten(8.0, 0, 0.0, &[], &[]).is_err());
}

#[test]
fn hill_kinetics_propensity_behaves() {
    // 10 * 4^2 / (3^2 + 4^2) = 6.4
    let channel = Channel::hill(10.0, 0, 2.0, 3.0, &[], &[(1, 1)]).unwrap();
    assert!((channel.evaluate(&[4, 0]) - 6.4).abs() < 1e-12);
    assert_eq!(channel.evaluate(&[0, 0]), 0.0);
    assert!(Channel::hill(10.0, 0, -1.0, 3.0, &[], &[]).is_err());
}

#[test]
fn hill_kinetics_stay_finite_for_large_counts_and_exponents() {
    let channel = Channel::hill(1.0, 0, 60.0, 10.0, &[], &[(1, 1)]).unwrap();
    let saturated = channel.evaluate(&[1_000_000, 0]);
    assert!((saturated - 1.0).abs() < 1e-12);
    let repressed = channel.evaluate(&[1, 0]);
    assert!(repressed.is_finite() && (0.0..1e-50).contains(&repressed));
    assert!((channel.evaluate(&[10, 0]) - 0.5).abs() < 1e-12);

    let mut builder = Model::builder();
    let a = builder.species("A");
    let b = builder.species("B");
    builder.channel(Channel::hill(1.0, a, 60.0, 10.0, &[], &[(b, 1)]).unwrap());
    let model = builder.build().unwrap();
    let trajectory = simulate(&model, &[1_000_000, 0], &options(1.0), Some(6)).unwrap();
    assert_eq!(trajectory.termination(), Termination::HorizonReached);
}

#[test]
fn expression_propensity_evaluates() {
    let channel = Channel::expression("2.0 * s0 + s1", &[], &[(0, 1)]).unwrap();
    assert!((channel.evaluate(&[3, 5]) - 11.0).abs() < 1e-12);
    let scaled = channel.with_rate_constant(0.5);
    assert!((scaled.evaluate(&[3, 5]) - 5.5).abs() < 1e-12);
}

#[test]
fn custom_propensity_is_gated_on_reactants() {
    let channel = Channel::custom(|s| 10.0 * s[0] as f64, &[(1, 1)], &[(0, 1)]);
    assert_eq!(channel.evaluate(&[4, 0]), 0.0);
    assert_eq!(channel.evaluate(&[4, 1]), 40.0);
}

#[test]
fn collect_species_refs_deduplicates_and_is_case_insensitive() {
    assert_eq!(collect_species_refs("2*s0 + 3*S0 + s2").unwrap(), vec![0, 2]);
    assert_eq!(collect_species_refs("abs(s1) + s3").unwrap(), vec![1, 3]);
}

#[test]
fn builder_rejects_out_of_range_expression_species() {
    let mut builder = Model::builder();
    builder.anonymous_species(2);
    builder.channel(Channel::expression("s5 + 1", &[], &[(0, 1)]).unwrap());
    let err = builder.build().unwrap_err();
    assert!(matches!(err, SimError::InvalidArgument(msg) if msg.contains("species 5")));
}

#[test]
fn builder_validates_model_shape() {
    let mut empty = Model::builder();
    empty.species("A");
    assert!(matches!(empty.build(), Err(SimError::EmptyChannelSet)));

    let mut no_species = Model::builder();
    no_species.channel(Channel::mass_action(1.0, &[], &[]));
    assert!(matches!(no_species.build(), Err(SimError::NoSpecies)));

    let mut duplicate = Model::builder();
    duplicate.species("A");
    duplicate.species("A");
    duplicate.channel(Channel::mass_action(1.0, &[], &[(0, 1)]));
    assert!(matches!(duplicate.build(), Err(SimError::InvalidArgument(_))));

    let mut negative_rate = Model::builder();
    negative_rate.species("A");
    negative_rate.channel(Channel::mass_action(-1.0, &[], &[(0, 1)]));
    assert!(matches!(
        negative_rate.build(),
        Err(SimError::InvalidArgument(msg)) if msg.contains("rate constant")
    ));
}

#[test]
fn from_stoichiometry_derives_reactants_and_checks_shapes() {
    let model = Model::from_stoichiometry(2, &[-1, 1, 0, -1], &[2.0, 0.5]).unwrap();
    assert_eq!(model.n_channels(), 2);
    assert_eq!(model.species_index("s1"), Some(1));
    assert_eq!(model.propensities(&[3, 4]).unwrap(), vec![6.0, 2.0]);

    assert!(matches!(
        Model::from_stoichiometry(2, &[-1, 1, 0], &[1.0]),
        Err(SimError::Shape(_))
    ));
    assert!(matches!(
        Model::from_stoichiometry(2, &[-1, 1], &[1.0, 2.0]),
        Err(SimError::Shape(_))
    ));
}

#[test]
fn dependency_graph_follows_species_reads() {
    let mut builder = Model::builder();
    let a = builder.species("A");
    let b = builder.species("B");
    let c = builder.species("C");
    builder.channel(Channel::mass_action(1.0, &[(a, 1)], &[(b, 1)]));
    builder.channel(Channel::mass_action(1.0, &[(b, 1)], &[(c, 1)]));
    builder.channel(Channel::mass_action(1.0, &[(c, 1)], &[]));
    let model = builder.build().unwrap();
    assert_eq!(model.dependents(0), &[0, 1]);
    assert_eq!(model.dependents(1), &[1, 2]);
    assert_eq!(model.dependents(2), &[2]);

    let mut channels = model.channels().to_vec();
    channels.push(Channel::custom(|s| s[0] as f64, &[], &[]));
    let graph = build_dependency_graph(3, &channels);
    assert_eq!(graph[2], vec![2, 3]);
    assert_eq!(graph[3], vec![3]);
}

#[test]
fn propensity_tree_selects_expected_indices() {
    let props = vec![1.0, 3.0, 6.0];
    let mut tree = PropensityTree::new(props.len());
    tree.rebuild(&props);
    assert_eq!(tree.total(), 10.0);
    assert_eq!(tree.select(0.0), 0);
    assert_eq!(tree.select(0.5), 0);
    assert_eq!(tree.select(1.0), 1);
    assert_eq!(tree.select(3.9), 1);
    assert_eq!(tree.select(4.0), 2);
    assert_eq!(tree.select(9.99), 2);
    assert_eq!(tree.select(10.5), 2);
}

#[test]
fn propensity_tree_skips_zero_entries() {
    let props = vec![0.0, 2.0, 0.0, 5.0];
    let mut tree = PropensityTree::new(props.len());
    tree.rebuild(&props);
    assert_eq!(tree.select(0.0), 1);
    assert_eq!(tree.select(1.9), 1);
    assert_eq!(tree.select(2.0), 3);
    assert_eq!(tree.select(6.9), 3);
}

#[test]
fn propensity_tree_updates_after_modifications() {
    let mut tree = PropensityTree::new(2);
    tree.rebuild(&[2.0, 3.0]);
    assert_eq!(tree.total(), 5.0);
    tree.update(1, 1.0);
    assert!((tree.total() - 3.0).abs() < 1e-12);
    assert_eq!(tree.select(1.9), 0);
    assert_eq!(tree.select(2.1), 1);
}

#[test]
fn linear_selection_matches_cumulative_intervals() {
    let props = [0.0, 2.0, 0.0, 5.0];
    assert_eq!(select_linear(&props, 0.0), 1);
    assert_eq!(select_linear(&props, 1.9), 1);
    assert_eq!(select_linear(&props, 2.0), 3);
    assert_eq!(select_linear(&props, 7.5), 3);
}

#[test]
fn run_starts_with_initial_sample_and_stays_terminated() {
    let model = death_only_model();
    let opts = options(100.0);
    let mut sim = Simulation::new(&model, &[2], &opts, rng(3)).unwrap();
    let first = sim.next().unwrap().unwrap();
    assert_eq!(first.cause, Cause::Initial);
    assert_eq!(first.time, 0.0);
    assert_eq!(first.state, vec![2]);

    let rest: Vec<_> = sim.by_ref().collect::<SimResult<_>>().unwrap();
    assert_eq!(rest.len(), 2);
    assert!(rest.iter().all(|s| matches!(s.cause, Cause::Channel(0))));
    assert_eq!(sim.status(), RunStatus::Terminated(Termination::Absorbed));
    assert!(sim.next().is_none());
    assert!(sim.next().is_none());
}

#[test]
fn zero_propensity_start_is_absorbing() {
    let model = death_only_model();
    let trajectory = simulate(&model, &[0], &options(1.0), Some(123)).unwrap();
    assert_eq!(trajectory.len(), 1);
    assert_eq!(trajectory.firings(), 0);
    assert_eq!(trajectory.termination(), Termination::Absorbed);
    assert_eq!(trajectory.end_time(), 0.0);
}

#[test]
fn horizon_leaves_the_pre_overshoot_state() {
    let model = birth_death_model();
    let opts = options(2.0);
    let trajectory = simulate(&model, &[0], &opts, Some(11)).unwrap();
    assert_eq!(trajectory.termination(), Termination::HorizonReached);
    assert_eq!(trajectory.end_time(), 2.0);
    assert!(trajectory.final_time().unwrap() <= 2.0);
    assert_eq!(trajectory.state_at(2.0), trajectory.final_state());
}

#[test]
fn firing_limit_stops_the_run() {
    let mut builder = Model::builder();
    let x = builder.species("X");
    builder.channel(Channel::mass_action(10.0, &[], &[(x, 1)]));
    let model = builder.build().unwrap();
    let opts = SimulationOptions {
        t_max: 1e9,
        max_firings: Some(5),
        ..SimulationOptions::default()
    };
    let trajectory = simulate(&model, &[0], &opts, Some(1)).unwrap();
    assert_eq!(trajectory.termination(), Termination::FiringLimit);
    assert_eq!(trajectory.firings(), 5);
    assert_eq!(trajectory.final_state(), Some(&[5][..]));
}

#[test]
fn absorption_on_the_last_allowed_firing_is_reported_as_absorbed() {
    let model = Model::from_stoichiometry(2, &[-1, 1], &[1.0]).unwrap();
    let opts = SimulationOptions {
        t_max: 1e6,
        max_firings: Some(5),
        ..SimulationOptions::default()
    };
    for selection in [ChannelSelection::LinearScan, ChannelSelection::Tree] {
        let opts = SimulationOptions {
            selection,
            ..opts.clone()
        };
        let trajectory = simulate(&model, &[5, 0], &opts, Some(21)).unwrap();
        assert_eq!(trajectory.termination(), Termination::Absorbed);
        assert_eq!(trajectory.firings(), 5);
        assert_eq!(trajectory.final_state(), Some(&[0, 5][..]));
    }

    let capped = SimulationOptions {
        max_firings: Some(3),
        ..opts
    };
    let trajectory = simulate(&model, &[5, 0], &capped, Some(21)).unwrap();
    assert_eq!(trajectory.termination(), Termination::FiringLimit);
    assert_eq!(trajectory.final_state(), Some(&[2, 3][..]));
}

#[test]
fn negative_propensity_aborts_the_run() {
    let mut builder = Model::builder();
    let x = builder.species("X");
    builder.channel(Channel::custom(|_| -1.0, &[], &[(x, 1)]));
    let model = builder.build().unwrap();
    let opts = options(1.0);
    let mut sim = Simulation::new(&model, &[0], &opts, rng(5)).unwrap();
    assert!(sim.next().unwrap().is_ok());
    let err = sim.next().unwrap().unwrap_err();
    assert!(matches!(err, SimError::InvalidPropensity { channel: 0, value } if value == -1.0));
    assert_eq!(sim.status(), RunStatus::Failed);
    assert!(sim.next().is_none());
}

#[test]
fn failed_expression_evaluation_is_an_invalid_propensity() {
    let mut builder = Model::builder();
    builder.anonymous_species(1);
    builder.channel(Channel::expression("unknown + s0", &[], &[(0, 1)]).unwrap());
    let model = builder.build().unwrap();
    let err = simulate(&model, &[1], &options(1.0), Some(2)).unwrap_err();
    assert!(matches!(err, SimError::InvalidPropensity { channel: 0, value } if value.is_nan()));
}

#[test]
fn count_overflow_is_reported() {
    let mut builder = Model::builder();
    let x = builder.species("X");
    builder.channel(Channel::mass_action(1.0, &[], &[(x, 1)]));
    let model = builder.build().unwrap();
    let err = simulate(&model, &[Count::MAX], &options(1e6), Some(8)).unwrap_err();
    assert!(matches!(
        err,
        SimError::CountOutOfRange {
            channel: 0,
            species: 0
        }
    ));
}

#[test]
fn tree_and_linear_selection_both_absorb() {
    let model = Model::from_stoichiometry(2, &[-1, 1, 1, -1], &[1.0, 0.0]).unwrap();
    for selection in [ChannelSelection::LinearScan, ChannelSelection::Tree] {
        let opts = SimulationOptions {
            t_max: 1e6,
            selection,
            ..SimulationOptions::default()
        };
        let trajectory = simulate(&model, &[7, 0], &opts, Some(99)).unwrap();
        assert_eq!(trajectory.termination(), Termination::Absorbed);
        assert_eq!(trajectory.firings(), 7);
        assert_eq!(trajectory.final_state(), Some(&[0, 7][..]));
    }
}

#[test]
fn single_trajectory_is_reproducible() {
    let model = birth_death_model();
    let opts = options(1.0);
    let ensemble = EnsembleOptions::new(1)
        .seed(123)
        .threads(1)
        .output(OutputMode::Jumps);
    let initial = InitialStates::Shared(vec![0]);
    let first = run_ensemble(&model, &opts, &ensemble, &initial).unwrap();
    let second = run_ensemble(&model, &opts, &ensemble, &initial).unwrap();
    assert_eq!(first, second);
}

#[test]
fn ensemble_output_does_not_depend_on_thread_count() {
    let model = birth_death_model();
    let opts = options(3.0);
    let initial = InitialStates::Shared(vec![2]);
    let base = EnsembleOptions::new(16).seed(77).output(OutputMode::FinalOnly);
    let serial = run_ensemble(&model, &opts, &base.clone().threads(1), &initial).unwrap();
    let parallel = run_ensemble(&model, &opts, &base.threads(4), &initial).unwrap();
    assert_eq!(serial, parallel);
}

#[test]
fn timeseries_record_counts_match() {
    let model = birth_death_model();
    let opts = options(2.0);
    let ensemble = EnsembleOptions::new(3)
        .seed(77)
        .threads(2)
        .output(OutputMode::Timeseries(vec![0.5, 1.0]));
    let output = run_ensemble(&model, &opts, &ensemble, &InitialStates::Shared(vec![0])).unwrap();
    assert_eq!(output.len(), 3);
    for run in &output.runs {
        assert_eq!(run.times, vec![0.5, 1.0]);
        assert_eq!(run.states.len(), 2);
    }
}

#[test]
fn final_mode_returns_single_state() {
    let model = birth_death_model();
    let ensemble = EnsembleOptions::new(4).seed(5);
    let output =
        run_ensemble(&model, &options(2.0), &ensemble, &InitialStates::Shared(vec![0])).unwrap();
    assert_eq!(output.len(), 4);
    for run in &output.runs {
        assert_eq!(run.states.len(), 1);
        assert_eq!(run.times, vec![2.0]);
        assert_eq!(run.termination, Termination::HorizonReached);
    }
}

#[test]
fn expression_kinetics_converge_to_absorbing_state() {
    let model = saturating_expression_model();
    let ensemble = EnsembleOptions::new(8).seed(1234).threads(2);
    let output =
        run_ensemble(&model, &options(2.0), &ensemble, &InitialStates::Shared(vec![0, 0]))
            .unwrap();
    for run in &output.runs {
        assert_eq!(run.final_state(), Some(&[1, 1][..]));
        assert_eq!(run.termination, Termination::Absorbed);
    }
}

#[test]
fn run_ensemble_validates_initial_state_and_counts() {
    let model = birth_death_model();
    let opts = options(1.0);
    let ensemble = EnsembleOptions::new(1);

    let err = run_ensemble(&model, &opts, &ensemble, &InitialStates::Shared(vec![0, 0]))
        .unwrap_err();
    assert!(matches!(err, SimError::Shape(msg) if msg.contains("initial state length")));

    let err = run_ensemble(
        &model,
        &opts,
        &EnsembleOptions::new(0),
        &InitialStates::Shared(vec![0]),
    )
    .unwrap_err();
    assert!(
        matches!(err, SimError::InvalidArgument(msg) if msg.contains("number of trajectories"))
    );

    let bad_horizon = SimulationOptions {
        t_max: 0.0,
        ..SimulationOptions::default()
    };
    let err = run_ensemble(&model, &bad_horizon, &ensemble, &InitialStates::Shared(vec![0]))
        .unwrap_err();
    assert!(matches!(err, SimError::InvalidArgument(msg) if msg.contains("t_max")));
}

#[test]
fn timeseries_points_are_validated() {
    let model = birth_death_model();
    let opts = options(1.0);
    let initial = InitialStates::Shared(vec![0]);
    for points in [
        vec![],
        vec![0.5, 0.2],
        vec![0.5, 1.5],
        vec![f64::NAN],
        vec![0.2, f64::NAN, 0.8],
        vec![f64::NEG_INFINITY, 0.5],
    ] {
        let ensemble = EnsembleOptions::new(1).output(OutputMode::Timeseries(points));
        assert!(matches!(
            run_ensemble(&model, &opts, &ensemble, &initial),
            Err(SimError::InvalidArgument(_))
        ));
    }
}

#[test]
fn timeseries_reports_the_state_in_effect_at_each_point() {
    let model = inert_model();
    let opts = SimulationOptions {
        interventions: InterventionPlan::new()
            .at(
                0.5,
                [InterventionAction::SpeciesSet {
                    species: 0,
                    value: 7,
                }],
            )
            .unwrap(),
        ..options(1.0)
    };
    let ensemble = EnsembleOptions::new(1)
        .seed(9)
        .output(OutputMode::Timeseries(vec![0.25, 0.5, 0.75]));
    let output = run_ensemble(&model, &opts, &ensemble, &InitialStates::Shared(vec![0])).unwrap();
    assert_eq!(output.runs[0].states, vec![vec![0], vec![7], vec![7]]);
}

#[test]
fn interventions_can_modify_species_without_reactions() {
    let model = inert_model();
    let opts = SimulationOptions {
        interventions: InterventionPlan::new()
            .at(
                0.5,
                [InterventionAction::SpeciesSet {
                    species: 0,
                    value: 7,
                }],
            )
            .unwrap(),
        ..options(1.0)
    };
    let trajectory = simulate(&model, &[0], &opts, Some(9)).unwrap();
    assert_eq!(trajectory.termination(), Termination::Absorbed);
    assert_eq!(trajectory.firings(), 0);
    assert_eq!(trajectory.samples()[1].cause, Cause::Intervention);
    assert_eq!(trajectory.samples()[1].time, 0.5);
    assert_eq!(trajectory.final_state(), Some(&[7][..]));
}

#[test]
fn rate_set_intervention_revives_a_silent_channel() {
    let model = inert_model();
    let opts = SimulationOptions {
        interventions: InterventionPlan::new()
            .at(
                0.0,
                [InterventionAction::RateSet {
                    channel: 0,
                    value: 1000.0,
                }],
            )
            .unwrap(),
        ..options(1.0)
    };
    for selection in [ChannelSelection::LinearScan, ChannelSelection::Tree] {
        let opts = SimulationOptions {
            selection,
            ..opts.clone()
        };
        let trajectory = simulate(&model, &[0], &opts, Some(4)).unwrap();
        assert_eq!(trajectory.samples()[0].cause, Cause::Initial);
        assert!(trajectory.firings() > 0);
        assert_eq!(trajectory.termination(), Termination::HorizonReached);
    }
}

#[test]
fn intervention_plan_is_validated() {
    assert!(
        InterventionPlan::new()
            .at(
                2.0,
                [InterventionAction::SpeciesDelta {
                    species: 0,
                    delta: 1
                }]
            )
            .unwrap()
            .at(
                1.0,
                [InterventionAction::SpeciesDelta {
                    species: 0,
                    delta: 1
                }]
            )
            .is_err()
    );
    assert!(InterventionPlan::new().at(1.0, []).is_err());

    let model = inert_model();
    let plan = InterventionPlan::new()
        .at(
            0.1,
            [InterventionAction::RateSet {
                channel: 3,
                value: 1.0,
            }],
        )
        .unwrap();
    assert!(matches!(
        plan.validate(&model),
        Err(SimError::InvalidArgument(msg)) if msg.contains("channel index 3")
    ));
}

#[test]
fn intervention_cannot_drive_counts_negative() {
    let model = inert_model();
    let opts = SimulationOptions {
        interventions: InterventionPlan::new()
            .at(
                0.5,
                [InterventionAction::SpeciesDelta {
                    species: 0,
                    delta: -3,
                }],
            )
            .unwrap(),
        ..options(1.0)
    };
    assert!(matches!(
        simulate(&model, &[2], &opts, Some(1)),
        Err(SimError::InvalidArgument(msg)) if msg.contains("below zero")
    ));
}

#[test]
fn per_trajectory_initial_states_are_honored() {
    let model = inert_model();
    let initial = InitialStates::PerTrajectory(vec![vec![3], vec![7]]);
    let output =
        run_ensemble(&model, &options(1.0), &EnsembleOptions::new(2).seed(11), &initial).unwrap();
    let finals: Vec<_> = output.runs.iter().map(|r| r.states[0].clone()).collect();
    assert_eq!(finals, vec![vec![3], vec![7]]);
}

#[test]
fn per_trajectory_initial_states_validate_lengths() {
    let model = inert_model();
    let initial = InitialStates::PerTrajectory(vec![vec![1], vec![2]]);
    let err = run_ensemble(&model, &options(1.0), &EnsembleOptions::new(3), &initial).unwrap_err();
    assert!(matches!(err, SimError::Shape(msg) if msg.contains("initial_states length")));
}

#[test]
fn per_trajectory_initial_times_skip_past_events() {
    let model = inert_model();
    let opts = SimulationOptions {
        interventions: InterventionPlan::new()
            .at(
                1.0,
                [InterventionAction::SpeciesSet {
                    species: 0,
                    value: 50,
                }],
            )
            .unwrap()
            .at(
                6.0,
                [InterventionAction::SpeciesDelta {
                    species: 0,
                    delta: 1,
                }],
            )
            .unwrap(),
        ..options(10.0)
    };
    let ensemble = EnsembleOptions {
        initial_times: Some(vec![5.0]),
        ..EnsembleOptions::new(1).seed(7)
    };
    let output = run_ensemble(&model, &opts, &ensemble, &InitialStates::Shared(vec![0])).unwrap();
    assert_eq!(output.runs[0].final_state(), Some(&[1][..]));
}

#[test]
fn per_trajectory_initial_times_validate_length() {
    let model = inert_model();
    let ensemble = EnsembleOptions {
        initial_times: Some(vec![1.0]),
        ..EnsembleOptions::new(2)
    };
    let err = run_ensemble(&model, &options(5.0), &ensemble, &InitialStates::Shared(vec![0]))
        .unwrap_err();
    assert!(matches!(err, SimError::Shape(msg) if msg.contains("initial_times length")));
}

#[test]
fn options_round_trip_through_json() {
    let opts = SimulationOptions {
        t_start: 1.0,
        t_max: 25.0,
        selection: ChannelSelection::Tree,
        max_firings: Some(10_000),
        interventions: InterventionPlan::new()
            .at(
                3.0,
                [InterventionAction::RateSet {
                    channel: 0,
                    value: 2.5,
                }],
            )
            .unwrap(),
    };
    let json = serde_json::to_string(&opts).unwrap();
    let decoded: SimulationOptions = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, opts);

    let minimal: SimulationOptions =
        serde_json::from_str(r#"{"t_start": 0.0, "t_max": 4.0}"#).unwrap();
    assert_eq!(minimal, SimulationOptions::with_horizon(4.0));
}

#[test]
fn sparse_counts_treat_absent_keys_as_zero() {
    let mut lengths = SparseCounts::with_limit(10);
    assert_eq!(lengths.get(3), 0);
    assert_eq!(lengths.add(3, 4).unwrap(), 4);
    assert_eq!(lengths.increment(5).unwrap(), 1);
    assert_eq!(lengths.add(3, -4).unwrap(), 0);
    assert_eq!(lengths.len(), 1);
    assert!(lengths.add(5, -2).is_err());
    assert!(lengths.increment(10).is_err());
    assert_eq!(lengths.to_dense(6).unwrap(), vec![0, 0, 0, 0, 0, 1]);
    assert!(lengths.to_dense(5).is_err());
}

#[test]
fn sparse_counts_summaries() {
    let counts = SparseCounts::from_dense(&[0, 2, 0, 2]);
    assert_eq!(counts.total(), 4);
    assert_eq!(counts.max_key(), Some(3));
    assert_eq!(counts.mean_key(), Some(2.0));
    assert_eq!(counts.frequencies(), vec![(1, 0.5), (3, 0.5)]);
    assert_eq!(SparseCounts::new().mean_key(), None);
}

#[test]
fn analysis_summarizes_ensembles() {
    let model = inert_model();
    let initial = InitialStates::PerTrajectory(vec![vec![3], vec![7], vec![3]]);
    let output =
        run_ensemble(&model, &options(1.0), &EnsembleOptions::new(3).seed(2), &initial).unwrap();
    let histogram = final_distribution(&output, 0).unwrap();
    assert_eq!(histogram.get(3), 2);
    assert_eq!(histogram.get(7), 1);
    assert!(final_distribution(&output, 1).is_err());
    assert!(mean_timeseries(&output, 0).is_err());
    assert_eq!(
        termination_counts(&output).get(&Termination::Absorbed),
        Some(&3)
    );
}
