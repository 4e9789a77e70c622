//! Species, reaction channels and their propensity laws.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use meval::{Context, ContextProvider, Expr};

use crate::error::{SimError, SimResult};

/// Molecule count of a single species.
pub type Count = u64;

/// Caller-supplied propensity law, evaluated against the full state vector.
pub type PropensityFn = Arc<dyn Fn(&[Count]) -> f64 + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Reactant {
    pub(crate) species: usize,
    pub(crate) count: u32,
}

/// Net change applied to one species when a channel fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpeciesDelta {
    pub species: usize,
    pub delta: i64,
}

/// Propensity law of a channel. The channel's rate constant multiplies the
/// value of every law.
#[derive(Clone)]
pub enum Kinetics {
    /// `k * prod(x_s * (x_s - 1) * ... * (x_s - n_s + 1))` over the reactants.
    MassAction,
    /// `V * x_a^n / (K^n + x_a^n)`, evaluated as `V / (1 + (K / x_a)^n)`.
    Hill {
        activator: usize,
        hill_n: f64,
        k_half: f64,
    },
    /// `V * x_s / (K_m + x_s)`.
    MichaelisMenten { substrate: usize, k_m: f64 },
    /// Arithmetic expression over the species variables `s0, s1, ...`.
    Expression { expr: Expr, species_refs: Vec<usize> },
    /// Arbitrary caller function of the state.
    Custom(PropensityFn),
}

impl fmt::Debug for Kinetics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MassAction => f.write_str("MassAction"),
            Self::Hill {
                activator,
                hill_n,
                k_half,
            } => f
                .debug_struct("Hill")
                .field("activator", activator)
                .field("hill_n", hill_n)
                .field("k_half", k_half)
                .finish(),
            Self::MichaelisMenten { substrate, k_m } => f
                .debug_struct("MichaelisMenten")
                .field("substrate", substrate)
                .field("k_m", k_m)
                .finish(),
            Self::Expression { species_refs, .. } => f
                .debug_struct("Expression")
                .field("species_refs", species_refs)
                .finish_non_exhaustive(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

struct SpeciesContext<'a> {
    state: &'a [Count],
}

impl ContextProvider for SpeciesContext<'_> {
    fn get_var(&self, name: &str) -> Option<f64> {
        parse_species_variable(name).and_then(|idx| self.state.get(idx).map(|&c| c as f64))
    }
}

fn parse_species_variable(name: &str) -> Option<usize> {
    let digits = name.strip_prefix('s').or_else(|| name.strip_prefix('S'))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<usize>().ok()
}

/// Species indices referenced as `sN` (or `SN`) in an expression, in order of
/// first appearance. Identifiers that merely contain an `s` followed by digits,
/// such as `abs2`, are not species references.
pub(crate) fn collect_species_refs(expr_str: &str) -> SimResult<Vec<usize>> {
    let bytes = expr_str.as_bytes();
    let mut refs = Vec::new();
    let mut idx = 0;
    while idx < bytes.len() {
        let ch = bytes[idx];
        let starts_word =
            idx == 0 || !(bytes[idx - 1].is_ascii_alphanumeric() || bytes[idx - 1] == b'_');
        if starts_word && (ch == b's' || ch == b'S') {
            let mut end = idx + 1;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            let ends_word = end == bytes.len()
                || !(bytes[end].is_ascii_alphabetic() || bytes[end] == b'_');
            if end > idx + 1 && ends_word {
                let digits = &expr_str[idx + 1..end];
                let species = digits.parse::<usize>().map_err(|_| {
                    SimError::InvalidArgument(format!(
                        "expression contains invalid species index '{digits}'"
                    ))
                })?;
                if !refs.contains(&species) {
                    refs.push(species);
                }
                idx = end;
                continue;
            }
        }
        idx += 1;
    }
    Ok(refs)
}

#[inline]
pub(crate) fn falling_factorial(value: Count, count: u32) -> f64 {
    match count {
        0 => 1.0,
        1 => value as f64,
        _ if value < count as Count => 0.0,
        _ => (0..count as Count).fold(1.0, |acc, i| acc * (value - i) as f64),
    }
}

/// One reaction channel: a fixed stoichiometric effect plus a propensity law.
#[derive(Clone, Debug)]
pub struct Channel {
    label: Option<String>,
    rate_constant: f64,
    reactants: Vec<Reactant>,
    deltas: Vec<SpeciesDelta>,
    kinetics: Kinetics,
}

impl Channel {
    fn with_kinetics(
        rate_constant: f64,
        reactants: &[(usize, u32)],
        products: &[(usize, u32)],
        kinetics: Kinetics,
    ) -> Self {
        let mut consumed: BTreeMap<usize, u32> = BTreeMap::new();
        for &(species, count) in reactants {
            *consumed.entry(species).or_insert(0) += count;
        }
        let mut net: BTreeMap<usize, i64> = BTreeMap::new();
        for (&species, &count) in &consumed {
            *net.entry(species).or_insert(0) -= i64::from(count);
        }
        for &(species, count) in products {
            *net.entry(species).or_insert(0) += i64::from(count);
        }
        Self {
            label: None,
            rate_constant,
            reactants: consumed
                .into_iter()
                .filter(|&(_, count)| count > 0)
                .map(|(species, count)| Reactant { species, count })
                .collect(),
            deltas: net
                .into_iter()
                .filter(|&(_, delta)| delta != 0)
                .map(|(species, delta)| SpeciesDelta { species, delta })
                .collect(),
            kinetics,
        }
    }

    /// Mass-action channel. `reactants` and `products` list `(species,
    /// multiplicity)` pairs; a species on both sides acts as a catalyst.
    pub fn mass_action(
        rate_constant: f64,
        reactants: &[(usize, u32)],
        products: &[(usize, u32)],
    ) -> Self {
        Self::with_kinetics(rate_constant, reactants, products, Kinetics::MassAction)
    }

    /// Hill-activated channel with maximal rate `v_max`.
    pub fn hill(
        v_max: f64,
        activator: usize,
        hill_n: f64,
        k_half: f64,
        reactants: &[(usize, u32)],
        products: &[(usize, u32)],
    ) -> SimResult<Self> {
        if !(hill_n > 0.0 && k_half > 0.0) {
            return Err(SimError::InvalidArgument(
                "Hill parameters must be positive".into(),
            ));
        }
        let kinetics = Kinetics::Hill {
            activator,
            hill_n,
            k_half,
        };
        Ok(Self::with_kinetics(v_max, reactants, products, kinetics))
    }

    /// Michaelis-Menten channel saturating in `substrate`.
    pub fn michaelis_menten(
        v_max: f64,
        substrate: usize,
        k_m: f64,
        reactants: &[(usize, u32)],
        products: &[(usize, u32)],
    ) -> SimResult<Self> {
        if !(k_m > 0.0) {
            return Err(SimError::InvalidArgument(
                "Michaelis-Menten k_m must be positive".into(),
            ));
        }
        let kinetics = Kinetics::MichaelisMenten { substrate, k_m };
        Ok(Self::with_kinetics(v_max, reactants, products, kinetics))
    }

    /// Channel whose propensity is an arithmetic expression in `s0, s1, ...`.
    pub fn expression(
        expr_str: &str,
        reactants: &[(usize, u32)],
        products: &[(usize, u32)],
    ) -> SimResult<Self> {
        let expr = Expr::from_str(expr_str).map_err(|err| {
            SimError::InvalidArgument(format!("expression parse error: {err}"))
        })?;
        let species_refs = collect_species_refs(expr_str)?;
        let kinetics = Kinetics::Expression { expr, species_refs };
        Ok(Self::with_kinetics(1.0, reactants, products, kinetics))
    }

    /// Channel driven by an arbitrary propensity function.
    pub fn custom<F>(propensity: F, reactants: &[(usize, u32)], products: &[(usize, u32)]) -> Self
    where
        F: Fn(&[Count]) -> f64 + Send + Sync + 'static,
    {
        Self::with_kinetics(
            1.0,
            reactants,
            products,
            Kinetics::Custom(Arc::new(propensity)),
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_rate_constant(mut self, rate_constant: f64) -> Self {
        self.rate_constant = rate_constant;
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn rate_constant(&self) -> f64 {
        self.rate_constant
    }

    pub fn kinetics(&self) -> &Kinetics {
        &self.kinetics
    }

    pub fn deltas(&self) -> &[SpeciesDelta] {
        &self.deltas
    }

    /// Propensity at `state` using the channel's own rate constant.
    pub fn evaluate(&self, state: &[Count]) -> f64 {
        self.propensity(self.rate_constant, state)
    }

    /// Zero whenever a reactant has fewer copies than the channel consumes,
    /// so firing can never drive a count negative.
    #[inline]
    pub(crate) fn propensity(&self, rate_constant: f64, state: &[Count]) -> f64 {
        if let Kinetics::MassAction = self.kinetics {
            let mut propensity = rate_constant;
            for reactant in &self.reactants {
                let available = state[reactant.species];
                if available < Count::from(reactant.count) {
                    return 0.0;
                }
                propensity *= falling_factorial(available, reactant.count);
            }
            return propensity;
        }

        if self
            .reactants
            .iter()
            .any(|r| state[r.species] < Count::from(r.count))
        {
            return 0.0;
        }
        match &self.kinetics {
            Kinetics::MassAction => rate_constant,
            Kinetics::Hill {
                activator,
                hill_n,
                k_half,
            } => {
                let level = state[*activator];
                if level == 0 {
                    0.0
                } else {
                    // Ratio form stays finite for large counts and exponents.
                    rate_constant / (1.0 + (k_half / level as f64).powf(*hill_n))
                }
            }
            Kinetics::MichaelisMenten { substrate, k_m } => {
                let substrate_count = state[*substrate] as f64;
                rate_constant * substrate_count / (k_m + substrate_count)
            }
            Kinetics::Expression { expr, .. } => {
                let ctx = (SpeciesContext { state }, Context::new());
                expr.eval_with_context(ctx)
                    .map(|value| rate_constant * value)
                    .unwrap_or(f64::NAN)
            }
            Kinetics::Custom(f) => rate_constant * f(state),
        }
    }

    /// Species read by the propensity law, or `None` when it may read any.
    fn species_read(&self) -> Option<Vec<usize>> {
        let mut read: Vec<usize> = self.reactants.iter().map(|r| r.species).collect();
        match &self.kinetics {
            Kinetics::MassAction => {}
            Kinetics::Hill { activator, .. } => read.push(*activator),
            Kinetics::MichaelisMenten { substrate, .. } => read.push(*substrate),
            Kinetics::Expression { species_refs, .. } => read.extend(species_refs),
            Kinetics::Custom(_) => return None,
        }
        Some(read)
    }

    fn check_species(&self, idx: usize, n_species: usize) -> SimResult<()> {
        let out_of_range = |species: usize| {
            SimError::InvalidArgument(format!(
                "channel {idx} refers to species {species} but the model has {n_species}"
            ))
        };
        if let Some(d) = self.deltas.iter().find(|d| d.species >= n_species) {
            return Err(out_of_range(d.species));
        }
        if let Some(read) = self.species_read() {
            if let Some(&species) = read.iter().find(|&&s| s >= n_species) {
                return Err(out_of_range(species));
            }
        }
        if !(self.rate_constant.is_finite() && self.rate_constant >= 0.0) {
            return Err(SimError::InvalidArgument(format!(
                "channel {idx} rate constant must be finite and non-negative, got {}",
                self.rate_constant
            )));
        }
        Ok(())
    }
}

/// Immutable reaction network: named species and a fixed list of channels.
#[derive(Clone, Debug)]
pub struct Model {
    species: Vec<String>,
    channels: Vec<Channel>,
    dependencies: Vec<Vec<usize>>,
}

impl Model {
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    /// Mass-action model from a row-major `channels x species` stoichiometry
    /// matrix; negative entries are the reactants of each row.
    pub fn from_stoichiometry(
        n_species: usize,
        stoich: &[i64],
        rate_constants: &[f64],
    ) -> SimResult<Self> {
        if n_species == 0 {
            return Err(SimError::NoSpecies);
        }
        if stoich.len() % n_species != 0 {
            return Err(SimError::Shape(format!(
                "stoichiometry length {} is not a multiple of species count {}",
                stoich.len(),
                n_species
            )));
        }
        let n_channels = stoich.len() / n_species;
        if rate_constants.len() != n_channels {
            return Err(SimError::Shape(format!(
                "rate constant length {} does not match channel count {}",
                rate_constants.len(),
                n_channels
            )));
        }

        let mut builder = Model::builder();
        builder.anonymous_species(n_species);
        for (row, &rate_constant) in stoich.chunks_exact(n_species).zip(rate_constants) {
            let mut reactants = Vec::new();
            let mut products = Vec::new();
            for (species, &delta) in row.iter().enumerate() {
                let magnitude = u32::try_from(delta.unsigned_abs()).map_err(|_| {
                    SimError::InvalidArgument(format!(
                        "stoichiometric coefficient {delta} is out of range"
                    ))
                })?;
                if delta < 0 {
                    reactants.push((species, magnitude));
                } else if delta > 0 {
                    products.push((species, magnitude));
                }
            }
            builder.channel(Channel::mass_action(rate_constant, &reactants, &products));
        }
        builder.build()
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn species_names(&self) -> &[String] {
        &self.species
    }

    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.species.iter().position(|s| s == name)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, idx: usize) -> Option<&Channel> {
        self.channels.get(idx)
    }

    /// Channels whose propensity may change when `channel` fires, itself first.
    pub(crate) fn dependents(&self, channel: usize) -> &[usize] {
        &self.dependencies[channel]
    }

    /// Evaluates every channel at `state`, rejecting invalid propensities.
    pub fn propensities(&self, state: &[Count]) -> SimResult<Vec<f64>> {
        if state.len() != self.n_species() {
            return Err(SimError::Shape(format!(
                "state length {} does not match number of species {}",
                state.len(),
                self.n_species()
            )));
        }
        self.channels
            .iter()
            .enumerate()
            .map(|(idx, channel)| checked_propensity(idx, channel.evaluate(state)))
            .collect()
    }
}

#[inline]
pub(crate) fn checked_propensity(channel: usize, value: f64) -> SimResult<f64> {
    if value >= 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(SimError::InvalidPropensity { channel, value })
    }
}

/// Incremental construction of a [`Model`].
#[derive(Clone, Debug, Default)]
pub struct ModelBuilder {
    species: Vec<String>,
    channels: Vec<Channel>,
}

impl ModelBuilder {
    /// Registers a species and returns its index in the state vector.
    pub fn species(&mut self, name: impl Into<String>) -> usize {
        self.species.push(name.into());
        self.species.len() - 1
    }

    /// Registers `n` species named `s<index>`.
    pub fn anonymous_species(&mut self, n: usize) -> &mut Self {
        for _ in 0..n {
            let idx = self.species.len();
            self.species.push(format!("s{idx}"));
        }
        self
    }

    /// Appends a channel and returns its index.
    pub fn channel(&mut self, channel: Channel) -> usize {
        self.channels.push(channel);
        self.channels.len() - 1
    }

    pub fn build(self) -> SimResult<Model> {
        let n_species = self.species.len();
        if n_species == 0 {
            return Err(SimError::NoSpecies);
        }
        if self.channels.is_empty() {
            return Err(SimError::EmptyChannelSet);
        }
        for (idx, name) in self.species.iter().enumerate() {
            if self.species[..idx].contains(name) {
                return Err(SimError::InvalidArgument(format!(
                    "duplicate species name '{name}'"
                )));
            }
        }
        for (idx, channel) in self.channels.iter().enumerate() {
            channel.check_species(idx, n_species)?;
        }
        let dependencies = build_dependency_graph(n_species, &self.channels);
        Ok(Model {
            species: self.species,
            channels: self.channels,
            dependencies,
        })
    }
}

pub(crate) fn build_dependency_graph(n_species: usize, channels: &[Channel]) -> Vec<Vec<usize>> {
    let mut readers: Vec<Vec<usize>> = vec![Vec::new(); n_species];
    for (idx, channel) in channels.iter().enumerate() {
        match channel.species_read() {
            Some(read) => {
                for species in read {
                    if readers[species].last() != Some(&idx) {
                        readers[species].push(idx);
                    }
                }
            }
            None => readers.iter_mut().for_each(|list| list.push(idx)),
        }
    }

    let mut seen = vec![usize::MAX; channels.len()];
    channels
        .iter()
        .enumerate()
        .map(|(idx, channel)| {
            seen[idx] = idx;
            let mut deps = vec![idx];
            for delta in &channel.deltas {
                for &dep in &readers[delta.species] {
                    if seen[dep] != idx {
                        seen[dep] = idx;
                        deps.push(dep);
                    }
                }
            }
            deps
        })
        .collect()
}
