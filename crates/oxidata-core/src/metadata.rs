//! Metadata document generation.
//!
//! Mechanical EDMX XML built from the registry: one entity type per table,
//! navigation properties from declared foreign keys, and one entity set per
//! table in the container.

use crate::schema::SchemaRegistry;
use std::fmt::Write;

const NAMESPACE: &str = "Oxidata";

/// Render the `$metadata` document.
pub fn build_metadata_xml(registry: &SchemaRegistry) -> String {
    let mut xml = String::new();

    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(
        "<edmx:Edmx xmlns:edmx=\"http://docs.oasis-open.org/odata/ns/edmx\" Version=\"4.0\">\n",
    );
    xml.push_str("  <edmx:DataServices>\n");
    let _ = write!(
        xml,
        "    <Schema xmlns=\"http://docs.oasis-open.org/odata/ns/edm\" Namespace=\"{}\">\n",
        NAMESPACE
    );

    for table in registry.tables() {
        let _ = write!(xml, "      <EntityType Name=\"{}\">\n", table.name);

        let pk = table.pk_name();
        if table.has_column(pk) {
            let _ = write!(
                xml,
                "        <Key><PropertyRef Name=\"{}\"/></Key>\n",
                pk
            );
        }

        for column in table.columns.values() {
            let _ = write!(
                xml,
                "        <Property Name=\"{}\" Type=\"{}\" Nullable=\"{}\"/>\n",
                column.name,
                column.column_type.edm_type(),
                column.nullable
            );
        }

        for fk in registry.navigations_from(&table.name) {
            let _ = write!(
                xml,
                "        <NavigationProperty Name=\"{}\" Type=\"{}.{}\"/>\n",
                fk.nav_name, NAMESPACE, fk.to_table
            );
        }

        xml.push_str("      </EntityType>\n");
    }

    xml.push_str("      <EntityContainer Name=\"Container\">\n");
    for table in registry.tables() {
        let _ = write!(
            xml,
            "        <EntitySet Name=\"{}\" EntityType=\"{}.{}\"/>\n",
            table.name, NAMESPACE, table.name
        );
    }
    xml.push_str("      </EntityContainer>\n");

    xml.push_str("    </Schema>\n");
    xml.push_str("  </edmx:DataServices>\n");
    xml.push_str("</edmx:Edmx>\n");

    xml
}
