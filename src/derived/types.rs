use crate::ids::Iri;

/// The `(downstream, rdf_type)` pairs gathered for one old output entity,
/// keyed by the entity itself so reconciliation can delete it afterward.
#[derive(Debug, Clone)]
pub struct OutputReferences {
    pub entity: Iri,
    pub rdf_type: Option<Iri>,
    pub downstream: Vec<Iri>,
}
