//! External collaborators (§6): the Triple-Store Gateway and the HTTP Agent
//! Caller. The Relational Gateway collaborator is `postgres::Client` itself,
//! passed into storage operations by the caller (§4.2, §5) — there is no
//! wrapper type for it here.

pub mod agent;
pub mod sparql;

pub use agent::{AgentCaller, AgentRequest, AgentResponse, HttpAgentCaller};
pub use sparql::{HttpSparqlGateway, SparqlGateway};
