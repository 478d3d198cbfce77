use std::collections::HashMap;

use super::extract::DerivedKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub key: DerivedKey,
    /// Indices into the table rows, in input order.
    pub rows: Vec<usize>,
}

impl Group {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Partitions rows by key. Groups come out in first-encounter order.
pub fn group_rows(keys: &[DerivedKey]) -> Vec<Group> {
    let mut positions: HashMap<&DerivedKey, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for (row, key) in keys.iter().enumerate() {
        match positions.get(key) {
            Some(&position) => {
                if let Some(group) = groups.get_mut(position) {
                    group.rows.push(row);
                }
            }
            None => {
                positions.insert(key, groups.len());
                groups.push(Group {
                    key: key.clone(),
                    rows: vec![row],
                });
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::MainReference;

    fn key(reference: &str, date: Option<&str>) -> DerivedKey {
        DerivedKey {
            main_reference: MainReference::Extracted(reference.to_string()),
            manifest_date: date.map(ToOwned::to_owned),
        }
    }

    #[test]
    fn groups_follow_first_encounter_order() {
        let keys = vec![
            key("B", None),
            key("A", None),
            key("B", None),
            key("C", None),
            key("A", None),
        ];

        let groups = group_rows(&keys);
        let order = groups
            .iter()
            .map(|group| group.key.main_reference.as_extracted().unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["B", "A", "C"]);
        assert_eq!(groups[0].rows, vec![0, 2]);
        assert_eq!(groups[1].rows, vec![1, 4]);
        assert_eq!(groups[2].rows, vec![3]);
    }

    #[test]
    fn date_component_splits_groups() {
        let keys = vec![
            key("A", Some("2024-01-02")),
            key("A", Some("2024-01-03")),
            key("A", Some("2024-01-02")),
            key("A", None),
        ];

        let groups = group_rows(&keys);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].rows, vec![0, 2]);
        assert_eq!(groups[2].key.manifest_date, None);
    }

    #[test]
    fn unparsed_rows_form_their_own_group() {
        let keys = vec![
            DerivedKey {
                main_reference: MainReference::Unparsed,
                manifest_date: None,
            },
            key("UNPARSED", None),
            DerivedKey {
                main_reference: MainReference::Unparsed,
                manifest_date: None,
            },
        ];

        let groups = group_rows(&keys);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key.main_reference, MainReference::Unparsed);
        assert_eq!(groups[0].rows, vec![0, 2]);
    }

    #[test]
    fn every_row_lands_in_exactly_one_group() {
        let keys = (0..50)
            .map(|index| key(&format!("R{}", index % 7), Some(&format!("D{}", index % 3))))
            .collect::<Vec<_>>();

        let groups = group_rows(&keys);
        let mut seen = groups
            .iter()
            .flat_map(|group| group.rows.iter().copied())
            .collect::<Vec<_>>();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }
}
