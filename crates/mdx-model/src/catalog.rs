use crate::value::CellValue;
use std::collections::HashMap;

pub type ModelResult<T> = Result<T, ModelError>;

/// Name of the implicit hierarchy holding one member per measure.
///
/// It is always present at ordinal 0, so the evaluator's "current measure" is
/// just the current member of hierarchy 0.
pub const MEASURES_HIERARCHY: &str = "Measures";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("unknown hierarchy: {0}")]
    UnknownHierarchy(String),

    #[error("unknown member [{hierarchy}].[{member}]")]
    UnknownMember { hierarchy: String, member: String },

    #[error("duplicate dimension: {0}")]
    DuplicateDimension(String),

    #[error("duplicate hierarchy: {0}")]
    DuplicateHierarchy(String),

    #[error("duplicate level [{hierarchy}].[{level}]")]
    DuplicateLevel { hierarchy: String, level: String },

    #[error("duplicate member [{hierarchy}].[{member}]")]
    DuplicateMember { hierarchy: String, member: String },

    #[error("duplicate measure: {0}")]
    DuplicateMeasure(String),

    #[error("hierarchy {hierarchy} has no level at depth {depth}")]
    MissingLevel { hierarchy: String, depth: usize },
}

/// Opaque handle to a member; stable for the lifetime of the catalog.
///
/// Handles are plain indexes, so evaluator context frames and memo snapshots can
/// copy them freely.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(u32);

impl MemberId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub struct Dimension {
    pub name: String,
    /// Ordinals of the hierarchies belonging to this dimension.
    pub hierarchies: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct Level {
    pub name: String,
    pub depth: usize,
    /// Backing column this level constrains in aggregate requests.
    pub column: String,
}

#[derive(Clone, Debug)]
pub struct Hierarchy {
    pub name: String,
    pub dimension: String,
    pub ordinal: usize,
    pub levels: Vec<Level>,
    pub default_member: Option<MemberId>,
    roots: Vec<MemberId>,
}

impl Hierarchy {
    pub fn root_members(&self) -> &[MemberId] {
        &self.roots
    }

    pub fn level_by_name(&self, name: &str) -> Option<&Level> {
        self.levels.iter().find(|l| l.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Debug)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub hierarchy: usize,
    pub depth: usize,
    /// Key value this member contributes to its level's backing column.
    pub key: CellValue,
    pub parent: Option<MemberId>,
    children: Vec<MemberId>,
}

impl Member {
    pub fn children(&self) -> &[MemberId] {
        &self.children
    }
}

#[derive(Clone, Debug)]
pub struct Measure {
    pub name: String,
    /// The member representing this measure in the measures hierarchy.
    pub member: MemberId,
    /// Fact column the aggregate backend rolls up for this measure.
    pub column: String,
}

/// Read-only lookup surface the engine and cache bridge consume.
///
/// The in-memory [`Catalog`] implements it; a server embedding the engine can
/// substitute its own schema-backed view.
pub trait CatalogView {
    fn hierarchy_count(&self) -> usize;
    fn hierarchy(&self, ordinal: usize) -> Option<&Hierarchy>;
    fn hierarchy_by_name(&self, name: &str) -> Option<&Hierarchy>;
    fn dimension_by_name(&self, name: &str) -> Option<&Dimension>;
    fn member(&self, id: MemberId) -> Option<&Member>;
    fn member_by_name(&self, ordinal: usize, name: &str) -> Option<&Member>;
    fn members_at_depth(&self, ordinal: usize, depth: usize) -> Vec<MemberId>;
    fn measure_for_member(&self, id: MemberId) -> Option<&Measure>;
    fn measure_by_name(&self, name: &str) -> Option<&Measure>;

    fn default_member(&self, ordinal: usize) -> Option<MemberId> {
        self.hierarchy(ordinal).and_then(|h| h.default_member)
    }
}

/// In-memory catalog with a build-then-freeze lifecycle: `add_*` during setup,
/// read-only through [`CatalogView`] afterwards.
#[derive(Clone, Debug)]
pub struct Catalog {
    dimensions: Vec<Dimension>,
    dimension_index: HashMap<String, usize>,
    hierarchies: Vec<Hierarchy>,
    hierarchy_index: HashMap<String, usize>,
    members: Vec<Member>,
    member_index: HashMap<(usize, String), MemberId>,
    measures: Vec<Measure>,
    measure_index: HashMap<String, usize>,
}

impl Catalog {
    /// Create a catalog holding only the implicit measures hierarchy (ordinal 0).
    pub fn new() -> Self {
        let mut catalog = Self {
            dimensions: Vec::new(),
            dimension_index: HashMap::new(),
            hierarchies: Vec::new(),
            hierarchy_index: HashMap::new(),
            members: Vec::new(),
            member_index: HashMap::new(),
            measures: Vec::new(),
            measure_index: HashMap::new(),
        };

        catalog.dimension_index.insert(fold(MEASURES_HIERARCHY), 0);
        catalog.dimensions.push(Dimension {
            name: MEASURES_HIERARCHY.to_string(),
            hierarchies: vec![0],
        });
        catalog.hierarchy_index.insert(fold(MEASURES_HIERARCHY), 0);
        catalog.hierarchies.push(Hierarchy {
            name: MEASURES_HIERARCHY.to_string(),
            dimension: MEASURES_HIERARCHY.to_string(),
            ordinal: 0,
            levels: vec![Level {
                name: "MeasuresLevel".to_string(),
                depth: 0,
                column: String::new(),
            }],
            default_member: None,
            roots: Vec::new(),
        });

        catalog
    }

    pub fn add_dimension(&mut self, name: impl Into<String>) -> ModelResult<()> {
        let name = name.into();
        if self.dimension_index.contains_key(&fold(&name)) {
            return Err(ModelError::DuplicateDimension(name));
        }
        self.dimension_index.insert(fold(&name), self.dimensions.len());
        self.dimensions.push(Dimension {
            name,
            hierarchies: Vec::new(),
        });
        Ok(())
    }

    /// Add a hierarchy under `dimension`, returning its ordinal.
    pub fn add_hierarchy(
        &mut self,
        dimension: &str,
        name: impl Into<String>,
    ) -> ModelResult<usize> {
        let name = name.into();
        let dim_idx = *self
            .dimension_index
            .get(&fold(dimension))
            .ok_or_else(|| ModelError::UnknownDimension(dimension.to_string()))?;
        if self.hierarchy_index.contains_key(&fold(&name)) {
            return Err(ModelError::DuplicateHierarchy(name));
        }

        let ordinal = self.hierarchies.len();
        self.hierarchy_index.insert(fold(&name), ordinal);
        self.hierarchies.push(Hierarchy {
            name,
            dimension: self.dimensions[dim_idx].name.clone(),
            ordinal,
            levels: Vec::new(),
            default_member: None,
            roots: Vec::new(),
        });
        self.dimensions[dim_idx].hierarchies.push(ordinal);
        Ok(ordinal)
    }

    /// Append a level (next depth down) to a hierarchy.
    pub fn add_level(
        &mut self,
        hierarchy: &str,
        name: impl Into<String>,
        column: impl Into<String>,
    ) -> ModelResult<usize> {
        let ordinal = self.hierarchy_ordinal(hierarchy)?;
        self.add_level_at(ordinal, name, column)
    }

    fn add_level_at(
        &mut self,
        ordinal: usize,
        name: impl Into<String>,
        column: impl Into<String>,
    ) -> ModelResult<usize> {
        let name = name.into();
        let hierarchy = &mut self.hierarchies[ordinal];
        if hierarchy.level_by_name(&name).is_some() {
            return Err(ModelError::DuplicateLevel {
                hierarchy: hierarchy.name.clone(),
                level: name,
            });
        }
        let depth = hierarchy.levels.len();
        hierarchy.levels.push(Level {
            name,
            depth,
            column: column.into(),
        });
        Ok(depth)
    }

    /// Add a member. Root members (no parent) sit at depth 0; the first root
    /// added becomes the hierarchy's default member.
    pub fn add_member(
        &mut self,
        hierarchy: &str,
        name: impl Into<String>,
        key: impl Into<CellValue>,
        parent: Option<MemberId>,
    ) -> ModelResult<MemberId> {
        let ordinal = self.hierarchy_ordinal(hierarchy)?;
        self.add_member_at(ordinal, name, key, parent)
    }

    fn add_member_at(
        &mut self,
        ordinal: usize,
        name: impl Into<String>,
        key: impl Into<CellValue>,
        parent: Option<MemberId>,
    ) -> ModelResult<MemberId> {
        let name = name.into();
        let depth = match parent {
            Some(p) => self.members[p.index()].depth + 1,
            None => 0,
        };
        let hierarchy_name = self.hierarchies[ordinal].name.clone();
        if depth >= self.hierarchies[ordinal].levels.len() {
            return Err(ModelError::MissingLevel {
                hierarchy: hierarchy_name,
                depth,
            });
        }
        if self.member_index.contains_key(&(ordinal, fold(&name))) {
            return Err(ModelError::DuplicateMember {
                hierarchy: hierarchy_name,
                member: name,
            });
        }

        let id = MemberId(self.members.len() as u32);
        self.member_index.insert((ordinal, fold(&name)), id);
        self.members.push(Member {
            id,
            name,
            hierarchy: ordinal,
            depth,
            key: key.into(),
            parent,
            children: Vec::new(),
        });

        match parent {
            Some(p) => self.members[p.index()].children.push(id),
            None => {
                let hierarchy = &mut self.hierarchies[ordinal];
                hierarchy.roots.push(id);
                if hierarchy.default_member.is_none() {
                    hierarchy.default_member = Some(id);
                }
            }
        }
        Ok(id)
    }

    /// Register a measure; also materializes its member in the measures
    /// hierarchy. The first measure registered is the default.
    pub fn add_measure(
        &mut self,
        name: impl Into<String>,
        column: impl Into<String>,
    ) -> ModelResult<MemberId> {
        let name = name.into();
        if self.measure_index.contains_key(&fold(&name)) {
            return Err(ModelError::DuplicateMeasure(name));
        }

        let member = self.add_member_at(0, name.clone(), name.clone(), None)?;
        self.measure_index.insert(fold(&name), self.measures.len());
        self.measures.push(Measure {
            name,
            member,
            column: column.into(),
        });
        Ok(member)
    }

    fn hierarchy_ordinal(&self, name: &str) -> ModelResult<usize> {
        self.hierarchy_index
            .get(&fold(name))
            .copied()
            .ok_or_else(|| ModelError::UnknownHierarchy(name.to_string()))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogView for Catalog {
    fn hierarchy_count(&self) -> usize {
        self.hierarchies.len()
    }

    fn hierarchy(&self, ordinal: usize) -> Option<&Hierarchy> {
        self.hierarchies.get(ordinal)
    }

    fn hierarchy_by_name(&self, name: &str) -> Option<&Hierarchy> {
        let ordinal = *self.hierarchy_index.get(&fold(name))?;
        self.hierarchies.get(ordinal)
    }

    fn dimension_by_name(&self, name: &str) -> Option<&Dimension> {
        let idx = *self.dimension_index.get(&fold(name))?;
        self.dimensions.get(idx)
    }

    fn member(&self, id: MemberId) -> Option<&Member> {
        self.members.get(id.index())
    }

    fn member_by_name(&self, ordinal: usize, name: &str) -> Option<&Member> {
        let id = *self.member_index.get(&(ordinal, fold(name)))?;
        self.members.get(id.index())
    }

    fn members_at_depth(&self, ordinal: usize, depth: usize) -> Vec<MemberId> {
        self.members
            .iter()
            .filter(|m| m.hierarchy == ordinal && m.depth == depth)
            .map(|m| m.id)
            .collect()
    }

    fn measure_for_member(&self, id: MemberId) -> Option<&Measure> {
        self.measures.iter().find(|m| m.member == id)
    }

    fn measure_by_name(&self, name: &str) -> Option<&Measure> {
        let idx = *self.measure_index.get(&fold(name))?;
        self.measures.get(idx)
    }
}

fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time_catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_dimension("Time").unwrap();
        catalog.add_hierarchy("Time", "Time").unwrap();
        catalog.add_level("Time", "Year", "year").unwrap();
        catalog.add_level("Time", "Quarter", "quarter").unwrap();
        let y1997 = catalog.add_member("Time", "1997", 1997, None).unwrap();
        catalog.add_member("Time", "Q1", "Q1", Some(y1997)).unwrap();
        catalog.add_member("Time", "Q2", "Q2", Some(y1997)).unwrap();
        catalog.add_measure("Unit Sales", "unit_sales").unwrap();
        catalog
    }

    #[test]
    fn measures_hierarchy_is_ordinal_zero() {
        let catalog = time_catalog();
        assert_eq!(catalog.hierarchy(0).unwrap().name, MEASURES_HIERARCHY);
        let sales = catalog.measure_by_name("unit sales").unwrap();
        assert_eq!(catalog.member(sales.member).unwrap().hierarchy, 0);
        assert_eq!(catalog.default_member(0), Some(sales.member));
    }

    #[test]
    fn member_depth_follows_parent() {
        let catalog = time_catalog();
        let y1997 = catalog.member_by_name(1, "1997").unwrap();
        assert_eq!(y1997.depth, 0);
        assert_eq!(y1997.children().len(), 2);
        let q1 = catalog.member_by_name(1, "q1").unwrap();
        assert_eq!(q1.depth, 1);
        assert_eq!(q1.parent, Some(y1997.id));
        assert_eq!(catalog.default_member(1), Some(y1997.id));
    }

    #[test]
    fn member_below_deepest_level_is_rejected() {
        let mut catalog = time_catalog();
        let q1 = catalog.member_by_name(1, "Q1").unwrap().id;
        let err = catalog.add_member("Time", "Jan", "Jan", Some(q1)).unwrap_err();
        assert!(matches!(err, ModelError::MissingLevel { depth: 2, .. }));
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut catalog = time_catalog();
        assert!(matches!(
            catalog.add_dimension("time").unwrap_err(),
            ModelError::DuplicateDimension(_)
        ));
        assert!(matches!(
            catalog.add_measure("UNIT SALES", "x").unwrap_err(),
            ModelError::DuplicateMeasure(_)
        ));
    }
}
