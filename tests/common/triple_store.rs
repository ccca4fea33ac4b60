//! A tiny in-memory triple store implementing `SparqlGateway`, restricted to
//! the handful of single-triple-pattern query/update shapes the time-series
//! metadata module emits. Not a SPARQL engine — just enough of one to drive
//! the coordinator's compensation logic against real insert/delete effects
//! instead of a fully scripted mock.

use std::sync::Mutex;

use kg_coordinator::error::{MetadataReadError, MetadataWriteError};
use kg_coordinator::gateway::SparqlGateway;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Triple {
    s: String,
    p: String,
    o: String,
}

#[derive(Debug)]
enum Term {
    Var(String),
    Concrete(String),
}

pub struct InMemoryTripleStore {
    triples: Mutex<Vec<Triple>>,
    fail_update_containing: Mutex<Option<String>>,
}

impl InMemoryTripleStore {
    pub fn new() -> Self {
        Self {
            triples: Mutex::new(Vec::new()),
            fail_update_containing: Mutex::new(None),
        }
    }

    /// Every subsequent `execute_update` whose text contains `needle` fails
    /// without mutating the store, until `clear_update_failure` is called.
    pub fn fail_updates_containing(&self, needle: &str) {
        *self.fail_update_containing.lock().unwrap() = Some(needle.to_string());
    }

    pub fn clear_update_failure(&self) {
        *self.fail_update_containing.lock().unwrap() = None;
    }
}

fn strip_dot(s: &str) -> &str {
    s.trim().trim_end_matches('.').trim()
}

fn parse_term(tok: &str) -> Term {
    if let Some(stripped) = tok.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        Term::Concrete(stripped.to_string())
    } else if let Some(rest) = tok.strip_prefix('?') {
        Term::Var(rest.to_string())
    } else if tok.starts_with('"') {
        Term::Concrete(tok.trim_matches('"').to_string())
    } else {
        Term::Concrete(tok.to_string())
    }
}

fn parse_pattern(pattern: &str) -> (Term, Term, Term) {
    let toks: Vec<&str> = strip_dot(pattern).split_whitespace().collect();
    assert_eq!(toks.len(), 3, "expected a single triple pattern, got: {pattern}");
    (parse_term(toks[0]), parse_term(toks[1]), parse_term(toks[2]))
}

fn braces_content(text: &str) -> &str {
    let start = text.find('{').expect("query/update missing opening brace") + 1;
    let end = text.rfind('}').expect("query/update missing closing brace");
    &text[start..end]
}

fn term_matches(term: &Term, value: &str) -> bool {
    match term {
        Term::Var(_) => true,
        Term::Concrete(c) => c == value,
    }
}

impl SparqlGateway for InMemoryTripleStore {
    fn execute_query(&self, query: &str) -> Result<JsonValue, MetadataReadError> {
        let triples = self.triples.lock().unwrap();

        if let Some(ask_part) = query.trim().strip_prefix("ASK") {
            let (s, p, o) = parse_pattern(braces_content(ask_part));
            let found = triples
                .iter()
                .any(|t| term_matches(&s, &t.s) && term_matches(&p, &t.p) && term_matches(&o, &t.o));
            return Ok(serde_json::json!({ "ASK": found }));
        }

        if let Some(select_part) = query.trim().strip_prefix("SELECT") {
            let var_end = select_part.find("WHERE").expect("SELECT without WHERE");
            let var_name = select_part[..var_end]
                .trim()
                .strip_prefix('?')
                .expect("SELECT variable must start with ?")
                .to_string();
            let (s, p, o) = parse_pattern(braces_content(&select_part[var_end..]));

            let mut rows = Vec::new();
            for t in triples.iter() {
                if !(term_matches(&s, &t.s) && term_matches(&p, &t.p) && term_matches(&o, &t.o)) {
                    continue;
                }
                let bound = match (&s, &p, &o) {
                    (Term::Var(name), _, _) if *name == var_name => &t.s,
                    (_, Term::Var(name), _) if *name == var_name => &t.p,
                    (_, _, Term::Var(name)) if *name == var_name => &t.o,
                    _ => continue,
                };
                rows.push(serde_json::json!({ var_name.clone(): { "value": bound } }));
            }
            return Ok(JsonValue::Array(rows));
        }

        panic!("unsupported query shape: {query}");
    }

    fn execute_update(&self, update: &str) -> Result<(), MetadataWriteError> {
        if let Some(needle) = self.fail_update_containing.lock().unwrap().as_ref() {
            if update.contains(needle.as_str()) {
                return Err(MetadataWriteError(anyhow::anyhow!("simulated metadata write failure")));
            }
        }

        let mut triples = self.triples.lock().unwrap();

        for clause in update.split(" ; ") {
            let clause = clause.trim();
            if let Some(rest) = clause.strip_prefix("INSERT DATA") {
                for line in braces_content(rest).lines() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let (s, p, o) = parse_pattern(line);
                    let concrete = |t: Term| match t {
                        Term::Concrete(c) => c,
                        Term::Var(v) => panic!("INSERT DATA must not contain variables, got ?{v}"),
                    };
                    triples.push(Triple {
                        s: concrete(s),
                        p: concrete(p),
                        o: concrete(o),
                    });
                }
            } else if let Some(rest) = clause.strip_prefix("DELETE WHERE") {
                let (s, p, o) = parse_pattern(braces_content(rest));
                triples.retain(|t| {
                    !(term_matches(&s, &t.s) && term_matches(&p, &t.p) && term_matches(&o, &t.o))
                });
            } else {
                panic!("unsupported update clause: {clause}");
            }
        }

        Ok(())
    }
}
