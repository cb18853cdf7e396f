/*!
 * Entity naming by placeholder substitution.
 *
 * | Placeholder | Replaced by |
 * |---|---|
 * | `%nid` | node id with the node prefix |
 * | `%loc` | node location |
 * | `%ln` | `[location-]name` |
 * | `%n` | node name |
 * | `%pk` | property key |
 * | `%p` | property name |
 * | `%l` | value label |
 * | `%o` | object id |
 */

/// Substitution inputs for one entity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameParts {
    /// Node id with prefix, e.g. `nodeID_4`
    pub node_id: String,
    /// Location, empty when unset
    pub location: String,
    /// `[location-]name`
    pub location_name: String,
    /// Node name
    pub name: String,
    /// Property name
    pub property: String,
    /// Property key, empty when unset
    pub property_key: String,
    /// Value label
    pub label: String,
    /// Object id
    pub object_id: String,
}

/// Render an entity name from a template
pub fn entity_name(template: &str, parts: &NameParts) -> String {
    // Longer placeholders first: `%n` is a prefix of `%nid`, `%l` of `%ln` and `%loc`
    [
        ("%nid", &parts.node_id),
        ("%loc", &parts.location),
        ("%ln", &parts.location_name),
        ("%pk", &parts.property_key),
        ("%n", &parts.name),
        ("%p", &parts.property),
        ("%l", &parts.label),
        ("%o", &parts.object_id),
    ]
    .iter()
    .fold(template.to_string(), |name, (placeholder, value)| {
        name.replace(placeholder, value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> NameParts {
        NameParts {
            node_id: "nodeID_4".to_string(),
            location: "Kitchen".to_string(),
            location_name: "Kitchen-Sensor".to_string(),
            name: "Sensor".to_string(),
            property: "Air temperature".to_string(),
            property_key: String::new(),
            label: "Temperature".to_string(),
            object_id: "air_temperature".to_string(),
        }
    }

    #[test]
    fn test_default_template() {
        assert_eq!(entity_name("%ln_%o", &parts()), "Kitchen-Sensor_air_temperature");
    }

    #[test]
    fn test_overlapping_placeholders() {
        assert_eq!(entity_name("%nid %n %loc %l", &parts()), "nodeID_4 Sensor Kitchen Temperature");
        assert_eq!(entity_name("%p[%pk]", &parts()), "Air temperature[]");
    }

    #[test]
    fn test_literal_text_is_kept() {
        assert_eq!(entity_name("static", &parts()), "static");
    }
}
