//! AQL statements over the per-graph collections.
//!
//! Collection names are interpolated, so callers must pass a graph name that already passed
//! [`crate::graph::validate_graph_name`]. Everything else travels as bind variables.

/// Collection names derived from a graph name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphCollections {
    /// Chunk nodes.
    pub source: String,
    /// Extracted entity nodes.
    pub entity: String,
    /// Entity to chunk edges.
    pub has_source: String,
    /// Entity to entity edges.
    pub links_to: String,
}

impl GraphCollections {
    /// Derive the collection set for `graph`.
    pub fn for_graph(graph: &str) -> Self {
        Self {
            source: format!("{graph}_SOURCE"),
            entity: format!("{graph}_ENTITY"),
            has_source: format!("{graph}_HAS_SOURCE"),
            links_to: format!("{graph}_LINKS_TO"),
        }
    }
}

/// Upsert one chunk node bound as `@doc`.
pub fn insert_source(c: &GraphCollections) -> String {
    format!(
        "INSERT @doc INTO {} OPTIONS {{ overwriteMode: \"replace\" }}",
        c.source
    )
}

/// Upsert entity documents bound as `@docs`, merging attributes into existing entities.
pub fn upsert_entities(c: &GraphCollections) -> String {
    format!(
        "FOR doc IN @docs INSERT doc INTO {} OPTIONS {{ overwriteMode: \"update\" }}",
        c.entity
    )
}

/// Upsert entity documents bound as `@docs` that were committed without a source node, adding
/// `@file_id` to each entity's `claimed_by` list.
pub fn upsert_claimed_entities(c: &GraphCollections) -> String {
    format!(
        "FOR doc IN @docs UPSERT {{ _key: doc._key }} \
         INSERT MERGE(doc, {{ claimed_by: [@file_id] }}) \
         UPDATE MERGE(doc, {{ claimed_by: UNION_DISTINCT(OLD.claimed_by || [], [@file_id]) }}) \
         IN {}",
        c.entity
    )
}

/// Insert edges bound as `@docs` into `collection`, keeping edges that already exist.
pub fn insert_edges(collection: &str) -> String {
    format!(
        "FOR doc IN @docs INSERT doc INTO {collection} OPTIONS {{ overwriteMode: \"ignore\" }}"
    )
}

/// Retraction step 1: identifiers of chunks tagged with `@file_id`.
pub fn chunk_ids_for_file(c: &GraphCollections) -> String {
    format!(
        "FOR s IN {} FILTER s.file_id == @file_id RETURN s._id",
        c.source
    )
}

/// Retraction step 2: remove chunks whose identifier is in `@chunk_ids`.
pub fn remove_chunks(c: &GraphCollections) -> String {
    format!(
        "FOR s IN {source} FILTER s._id IN @chunk_ids REMOVE s IN {source}",
        source = c.source
    )
}

/// Retraction step 3: remove sourcing edges pointing at `@chunk_ids`.
pub fn remove_source_edges_to(c: &GraphCollections) -> String {
    format!(
        "FOR e IN {edges} FILTER e._to IN @chunk_ids REMOVE e IN {edges}",
        edges = c.has_source
    )
}

/// Retraction step 4, first half: drop `@file_id` from every entity claim list.
pub fn release_claims(c: &GraphCollections) -> String {
    format!(
        "FOR ent IN {entity} FILTER @file_id IN (ent.claimed_by || []) \
         UPDATE ent WITH {{ claimed_by: REMOVE_VALUE(ent.claimed_by, @file_id) }} IN {entity}",
        entity = c.entity
    )
}

/// Retraction step 4: remove entities with no remaining sourcing edge and no remaining claim.
pub fn remove_orphan_entities(c: &GraphCollections) -> String {
    format!(
        "FOR ent IN {entity} \
         FILTER LENGTH(ent.claimed_by || []) == 0 \
         FILTER LENGTH(FOR hs IN {edges} FILTER hs._from == ent._id LIMIT 1 RETURN 1) == 0 \
         REMOVE ent IN {entity}",
        entity = c.entity,
        edges = c.has_source
    )
}

/// Retraction step 5: remove sourcing edges with an unresolved endpoint.
pub fn remove_dangling_source_edges(c: &GraphCollections) -> String {
    format!(
        "FOR hs IN {edges} FILTER !DOCUMENT(hs._from) OR !DOCUMENT(hs._to) REMOVE hs IN {edges}",
        edges = c.has_source
    )
}

/// Retraction step 6: remove relationship edges whose entity endpoints no longer exist.
pub fn remove_dangling_links(c: &GraphCollections) -> String {
    format!(
        "FOR l IN {links} \
         FILTER !DOCUMENT({entity}, PARSE_IDENTIFIER(l._from).key) \
         OR !DOCUMENT({entity}, PARSE_IDENTIFIER(l._to).key) \
         REMOVE l IN {links}",
        links = c.links_to,
        entity = c.entity
    )
}
