//! Classification and observation of matched student pairs
//!
//! A matched pair table holds two former classmates per row, each with the
//! school they moved on to. Pairs are classified by how close those schools are,
//! then joined with residences and infection days.

use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashSet;

use crate::config::StatsConfig;
use crate::error::Result;
use crate::stats::distance::pair_distance;
use crate::stats::geocode::GeoLookup;
use crate::stats::infection::{InfectionLookup, co_infected, not_infected};
use crate::utils::arrow::TextColumns;
use crate::utils::logging::log_anomaly;

/// Family link types of the person network
pub const FAMILY_LINK_TYPES: [(&str, &str); 3] = [
    ("Co-Parents", "102"),
    ("Siblings", "103"),
    ("Parent-child", "104"),
];

/// Relation between the schools of two pair members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PairCategory {
    /// Same school, branch and program
    SameClass,
    /// Same school and branch, different program
    SameSchool,
    /// Same institution, different branch
    SameInstitution,
    /// Different institutions
    DifferentSchool,
}

impl PairCategory {
    pub const ALL: [Self; 4] = [
        Self::SameClass,
        Self::SameSchool,
        Self::SameInstitution,
        Self::DifferentSchool,
    ];

    #[must_use]
    pub fn classify(a: &PairMember, b: &PairMember) -> Self {
        if a.school != b.school {
            Self::DifferentSchool
        } else if a.branch != b.branch {
            Self::SameInstitution
        } else if a.program != b.program {
            Self::SameSchool
        } else {
            Self::SameClass
        }
    }

    /// Label used in statistics files
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SameClass => "same_class",
            Self::SameSchool => "same_school",
            Self::SameInstitution => "same_institution",
            Self::DifferentSchool => "different_inst",
        }
    }
}

/// One side of a matched pair
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PairMember {
    pub person: String,
    pub school: String,
    pub branch: String,
    pub program: String,
    pub postcode: String,
    pub municipality: String,
}

/// Two members of a matched pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPair {
    pub first: PairMember,
    pub second: PairMember,
}

/// Column names of one member in a matched pair table
#[derive(Debug, Clone)]
pub struct MemberColumns {
    pub person: String,
    pub school: String,
    pub branch: String,
    pub program: String,
    pub postcode: String,
    pub municipality: String,
}

impl MemberColumns {
    /// Default column names with `suffix` appended
    #[must_use]
    pub fn suffixed(suffix: &str) -> Self {
        Self {
            person: format!("RINPERSOON{suffix}"),
            school: format!("BRIN_crypt{suffix}"),
            branch: format!("BRINVEST{suffix}"),
            program: format!("OPLNR{suffix}"),
            postcode: format!("POSTCODE{suffix}"),
            municipality: format!("gemcode{suffix}"),
        }
    }

    fn names(&self) -> [String; 6] {
        [
            self.person.clone(),
            self.school.clone(),
            self.branch.clone(),
            self.program.clone(),
            self.postcode.clone(),
            self.municipality.clone(),
        ]
    }
}

/// Column names of both members
#[derive(Debug, Clone)]
pub struct PairColumns {
    pub first: MemberColumns,
    pub second: MemberColumns,
}

impl Default for PairColumns {
    fn default() -> Self {
        Self {
            first: MemberColumns::suffixed("1"),
            second: MemberColumns::suffixed("2"),
        }
    }
}

/// Read the members of every row of a matched pair table
pub fn read_member_pairs(batch: &RecordBatch, columns: &PairColumns) -> Result<Vec<MemberPair>> {
    let names: Vec<String> = columns
        .first
        .names()
        .into_iter()
        .chain(columns.second.names())
        .collect();
    let text = TextColumns::from_batch(batch, &names, "matched pair table")?;

    let member = |row: usize, offset: usize| PairMember {
        person: text.value(offset, row).trim().to_string(),
        school: text.value(offset + 1, row).to_string(),
        branch: text.value(offset + 2, row).to_string(),
        program: text.value(offset + 3, row).to_string(),
        postcode: text.value(offset + 4, row).to_string(),
        municipality: text.value(offset + 5, row).to_string(),
    };

    Ok((0..text.num_rows())
        .map(|row| MemberPair {
            first: member(row, 0),
            second: member(row, 6),
        })
        .collect())
}

/// A pair joined with residences and infection days
#[derive(Debug, Clone, PartialEq)]
pub struct PairObservation {
    pub first: String,
    pub second: String,
    /// School relation; `None` for pairs without schools
    pub category: Option<PairCategory>,
    /// Distance between the residences in metres
    pub distance: f64,
    pub co_infected: bool,
    pub not_infected: bool,
    /// Both schools share a postcode; `None` for pairs without schools
    pub same_postcode: Option<bool>,
    /// Both schools share a municipality; `None` for pairs without schools
    pub same_municipality: Option<bool>,
}

/// Observations and the pairs that could not be observed
#[derive(Debug, Clone, Default)]
pub struct Observations {
    pub pairs: Vec<PairObservation>,
    /// Pairs where a member has no known residence
    pub without_residence: usize,
}

/// Shared lookups for observing pairs
#[derive(Debug, Clone, Copy)]
pub struct Observer<'a> {
    pub residences: &'a GeoLookup,
    pub infections: &'a InfectionLookup,
    pub config: &'a StatsConfig,
}

impl Observer<'_> {
    /// Observe two people, `None` when either has no residence
    #[must_use]
    pub fn observe(&self, first: &str, second: &str) -> Option<PairObservation> {
        let a = self.residences.get(first)?;
        let b = self.residences.get(second)?;
        let (day_a, day_b) = (self.infections.day(first), self.infections.day(second));
        Some(PairObservation {
            first: first.to_string(),
            second: second.to_string(),
            category: None,
            distance: pair_distance(a, b, self.config.resolution_offset_m),
            co_infected: co_infected(day_a, day_b, self.config.co_infection_window_days),
            not_infected: not_infected(day_a, day_b),
            same_postcode: None,
            same_municipality: None,
        })
    }

    /// Observe matched pairs, classifying them by school relation
    #[must_use]
    pub fn observe_pairs(&self, pairs: &[MemberPair]) -> Observations {
        let mut observations = Observations::default();
        for pair in pairs {
            let Some(mut obs) = self.observe(&pair.first.person, &pair.second.person) else {
                observations.without_residence += 1;
                continue;
            };
            obs.category = Some(PairCategory::classify(&pair.first, &pair.second));
            obs.same_postcode = Some(pair.first.postcode == pair.second.postcode);
            obs.same_municipality = Some(pair.first.municipality == pair.second.municipality);
            observations.pairs.push(obs);
        }
        log_anomaly(
            observations.without_residence as u64,
            "pairs dropped without a known residence",
        );
        observations
    }

    /// Observe plain person links such as family relations
    pub fn observe_links<'p>(&self, links: impl IntoIterator<Item = (&'p str, &'p str)>) -> Observations {
        let mut observations = Observations::default();
        for (first, second) in links {
            match self.observe(first, second) {
                Some(obs) => observations.pairs.push(obs),
                None => observations.without_residence += 1,
            }
        }
        log_anomaly(
            observations.without_residence as u64,
            "links dropped without a known residence",
        );
        observations
    }
}

/// Column names of a family link table
#[derive(Debug, Clone)]
pub struct LinkColumns {
    pub source: String,
    pub target: String,
    pub link_type: String,
}

impl Default for LinkColumns {
    fn default() -> Self {
        Self {
            source: "RINPERSOONSRC".to_string(),
            target: "RINPERSOONDST".to_string(),
            link_type: "linktype".to_string(),
        }
    }
}

/// Family links of selected types
#[derive(Debug, Clone, Default)]
pub struct KinshipIndex {
    links: Vec<(String, String, String)>,
    pairs: FxHashSet<(String, String)>,
}

impl KinshipIndex {
    /// Keep links whose type is one of `types`
    pub fn from_batch(batch: &RecordBatch, columns: &LinkColumns, types: &[&str]) -> Result<Self> {
        let names = [
            columns.source.clone(),
            columns.target.clone(),
            columns.link_type.clone(),
        ];
        let text = TextColumns::from_batch(batch, &names, "family link table")?;

        let mut index = Self::default();
        for row in 0..text.num_rows() {
            let link_type = text.value(2, row).trim();
            if types.contains(&link_type) {
                index.insert(text.value(0, row).trim(), text.value(1, row).trim(), link_type);
            }
        }
        log::info!("Loaded {} family links", index.len());
        Ok(index)
    }

    pub fn insert(&mut self, source: &str, target: &str, link_type: &str) {
        self.links
            .push((source.to_string(), target.to_string(), link_type.to_string()));
        self.pairs.insert((source.to_string(), target.to_string()));
    }

    /// Whether two people are linked, in either direction
    #[must_use]
    pub fn contains(&self, a: &str, b: &str) -> bool {
        let key = (a.to_string(), b.to_string());
        self.pairs.contains(&key) || self.pairs.contains(&(key.1, key.0))
    }

    /// Links of one type as (source, target)
    pub fn links_of_type<'s>(&'s self, link_type: &'s str) -> impl Iterator<Item = (&'s str, &'s str)> + 's {
        self.links
            .iter()
            .filter(move |(_, _, t)| t == link_type)
            .map(|(s, d, _)| (s.as_str(), d.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
