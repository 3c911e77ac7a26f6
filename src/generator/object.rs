use indexmap::IndexMap;
use rand::Rng;

use super::Run;
use crate::error::GenError;
use crate::instance::Instance;
use crate::limits::LimitCursor;
use crate::template::ObjectNode;

impl Run<'_> {
    /// Required properties first, then a random quota of optional ones.
    /// An optional property that abandons is skipped, not retried.
    pub(super) fn object(
        &mut self,
        type_name: &str,
        node: &ObjectNode,
        cursor: LimitCursor<'_>,
        depth: usize,
    ) -> Result<Instance, GenError> {
        let forced = |name: &str| self.options.require.as_ref().is_some_and(|re| re.is_match(name));
        let (required, mut optional): (Vec<usize>, Vec<usize>) = (0..node.properties.len())
            .partition(|&i| node.properties[i].required || forced(&node.properties[i].name));

        // indexed like `node.properties` so the output keeps template order
        let mut values: Vec<Option<Instance>> = vec![None; node.properties.len()];

        for &i in &required {
            let prop = &node.properties[i];
            values[i] = Some(self.instantiate(&prop.type_name, cursor.descend(&prop.name), depth)?);
        }

        let min_props = node.min_properties.unwrap_or(0).max(required.len());
        let max_props = node.max_properties.unwrap_or(node.properties.len());
        let mut extra = min_props - required.len();
        if max_props > min_props {
            extra += self.rng().random_range(0..=max_props - min_props);
        }

        let mut produced = required.len();
        let mut last_abandon = None;
        while extra > 0 && !optional.is_empty() {
            let pick = self.rng().random_range(0..optional.len());
            let i = optional.swap_remove(pick);
            let prop = &node.properties[i];
            match self.instantiate(&prop.type_name, cursor.descend(&prop.name), depth) {
                Ok(value) => {
                    values[i] = Some(value);
                    produced += 1;
                    extra -= 1;
                }
                Err(GenError::Abandon(cause)) => {
                    tracing::trace!(type_name, property = %prop.name, %cause, "optional property skipped");
                    last_abandon = Some(cause);
                }
                Err(error) => return Err(error),
            }
        }

        if produced < min_props {
            return Err(match last_abandon {
                Some(cause) => cause.into(),
                None => GenError::InsufficientProperties {
                    type_name: type_name.to_string(),
                    produced,
                    min_properties: min_props,
                },
            });
        }

        let fields: IndexMap<String, Instance> = node
            .properties
            .iter()
            .zip(values)
            .filter_map(|(prop, value)| Some((prop.name.clone(), value?)))
            .collect();
        Ok(Instance::Object(fields))
    }
}
