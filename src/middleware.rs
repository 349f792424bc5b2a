use std::sync::Arc;

use crate::error::Error;
use crate::request::Exchange;

/// A wrapper around the request/response pair.
///
/// Middlewares are listed outermost first. `request_call` runs in list
/// order on the way to the wire; as soon as one populates
/// `exchange.response` the remaining middlewares and the wire writer are
/// skipped (a short-circuit). After the response exists, parsed off the
/// wire or installed by a middleware, `response_call` runs over the full
/// list in reverse, innermost first.
///
/// Middlewares may mutate the [`Exchange`] freely but must not assume
/// exclusive ownership of it: the same record is visible to every other
/// middleware and to the connection.
pub trait Middleware: Send + Sync {
    fn request_call(&self, exchange: &mut Exchange) -> Result<(), Error> {
        let _ = exchange;
        Ok(())
    }

    fn response_call(&self, exchange: &mut Exchange) -> Result<(), Error> {
        let _ = exchange;
        Ok(())
    }
}

/// The stack a connection starts with.
pub(crate) fn default_stack() -> Vec<Arc<dyn Middleware>> {
    vec![Arc::new(Expects)]
}

/// Raises [`Error::HttpStatus`] when the response status is not among the
/// exchange's expected ones. Does nothing when `expects` is unset.
pub struct Expects;

impl Middleware for Expects {
    fn response_call(&self, exchange: &mut Exchange) -> Result<(), Error> {
        if let (Some(expects), Some(response)) = (&exchange.expects, &exchange.response) {
            if !expects.contains(&response.status.as_u16()) {
                return Err(Error::HttpStatus(response.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{Expects, Middleware};
    use crate::common::{Headers, StatusCode};
    use crate::error::Error;
    use crate::options::{Defaults, RequestOptions, Scheme};
    use crate::request::Exchange;
    use crate::response::Response;

    fn exchange(expects: Option<Vec<u16>>, status: u16) -> Exchange {
        let defaults = Defaults::new(
            Scheme::Http,
            "example.test".to_string(),
            "80".to_string(),
            "/".to_string(),
        );
        let mut options = RequestOptions::new();
        if let Some(expects) = expects {
            options = options.with_expects(expects);
        }
        let mut exchange = defaults.merge(options).unwrap();
        exchange.response = Some(Response {
            status: StatusCode(status),
            headers: Headers::new(),
            body: Vec::new(),
            remote_ip: None,
        });
        exchange
    }

    #[test]
    fn expects_passes_matching_and_unset() {
        let mut ex = exchange(Some(vec![200, 201]), 201);
        assert!(Expects.response_call(&mut ex).is_ok());

        let mut ex = exchange(None, 500);
        assert!(Expects.response_call(&mut ex).is_ok());
    }

    #[test]
    fn expects_raises_on_unexpected_status() {
        let mut ex = exchange(Some(vec![200]), 404);
        match Expects.response_call(&mut ex) {
            Err(Error::HttpStatus(response)) => assert_eq!(response.status, StatusCode(404)),
            other => panic!("expected HttpStatus, got {:?}", other),
        }
    }
}
