use std::fmt;

/// Named, independently addressable section of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Routines,
    Exercises,
    Membership,
    Metadata,
}

impl Partition {
    pub const ALL: [Partition; 4] = [
        Partition::Routines,
        Partition::Exercises,
        Partition::Membership,
        Partition::Metadata,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Partition::Routines => "routines",
            Partition::Exercises => "exercises",
            Partition::Membership => "membership",
            Partition::Metadata => "metadata",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Partition::Routines => 0,
            Partition::Exercises => 1,
            Partition::Membership => 2,
            Partition::Metadata => 3,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How an entity type is laid out inside its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageSlot {
    /// Many records, upserted by identity.
    Keyed,
    /// One record under a fixed key, replaced wholesale.
    Singleton(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for partition in Partition::ALL {
            assert_eq!(Partition::from_name(partition.name()), Some(partition));
        }
        assert_eq!(Partition::from_name("sessions"), None);
    }

    #[test]
    fn test_indexes_are_distinct() {
        let mut seen: Vec<usize> = Partition::ALL.iter().map(|p| p.index()).collect();
        seen.dedup();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
