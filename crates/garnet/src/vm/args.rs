//! Binding call arguments to declared parameters.
//!
//! Methods and lambdas bind strictly: the positional count must fit the declared range.
//! Procs bind leniently: missing values become nil, extras are dropped and a lone Array
//! argument is spread over several parameters.

use crate::{
    exception::{ExcType, RunError, RunResult},
    iseq::{Iseq, ParamShape},
    types::RHash,
    value::Value,
    vm::{MethodContext, Scope, Vm},
};

/// How arguments are matched against parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArgMode {
    Strict,
    Lenient,
}

impl Vm {
    /// Writes `args` into the parameter slots of `scope` and returns the instruction index
    /// execution starts at (which skips the defaults of supplied optional parameters).
    ///
    /// `keywords` is true when the call site passed keyword arguments, packed into the
    /// trailing Hash.
    pub(crate) fn bind_params(
        &mut self,
        iseq: &Iseq,
        scope: &Scope,
        args: &[Value],
        block: Option<Value>,
        mode: ArgMode,
        keywords: bool,
    ) -> RunResult<usize> {
        let params = &iseq.params;
        let mut positional = args.to_vec();
        let keyword_hash = if params.keywords.is_empty() {
            None
        } else {
            self.take_keyword_hash(&mut positional, params, keywords)
        };

        match mode {
            ArgMode::Strict => RunError::check_arity(positional.len(), params.required(), params.max())?,
            ArgMode::Lenient => {
                if positional.len() == 1
                    && params.auto_splats()
                    && let Some(items) = self.try_array(positional[0])?
                {
                    positional = items;
                }
                if positional.len() < params.required() {
                    positional.resize(params.required(), Value::Nil);
                }
                if let Some(max) = params.max() {
                    positional.truncate(max);
                }
            }
        }

        let lead = params.lead as usize;
        let post = params.post as usize;
        let given = positional.len();
        let opt_given = (params.opt as usize).min(given - lead - post);
        for (slot, &value) in positional[..lead + opt_given].iter().enumerate() {
            scope.set(slot, value);
        }
        if params.rest {
            let rest = positional[lead + opt_given..given - post].to_vec();
            let rest = self.new_array(rest)?;
            scope.set(params.rest_index(), rest);
        }
        for (offset, &value) in positional[given - post..].iter().enumerate() {
            scope.set(params.post_start() + offset, value);
        }

        if !params.keywords.is_empty() {
            self.bind_keywords(params, scope, keyword_hash)?;
        }
        if params.block {
            scope.set(params.block_index(), block.unwrap_or(Value::Nil));
        }

        Ok(if params.opt > 0 { params.opt_table[opt_given] } else { 0 })
    }

    /// Removes the trailing keyword Hash from `positional` when it is one.
    fn take_keyword_hash(&self, positional: &mut Vec<Value>, params: &ParamShape, keywords: bool) -> Option<RHash> {
        let &last = positional.last()?;
        let hash = self.hash_of(last)?;
        if !(keywords || positional.len() > params.required()) {
            return None;
        }
        if !hash.pairs().all(|(key, _)| matches!(key, Value::Symbol(_))) {
            return None;
        }
        let hash = hash.clone();
        positional.pop();
        Some(hash)
    }

    fn bind_keywords(&mut self, params: &ParamShape, scope: &Scope, hash: Option<RHash>) -> RunResult<()> {
        let mut hash = hash.unwrap_or_default();
        let mut missing = Vec::new();
        for (offset, keyword) in params.keywords.iter().enumerate() {
            let key = self.hash_key(Value::Symbol(keyword.name), false);
            let value = match (hash.remove(&key), &keyword.default) {
                (Some((_, value)), _) => value,
                (None, Some(default)) => self.literal(default)?,
                (None, None) => {
                    missing.push(format!(":{}", self.interns.get(keyword.name)));
                    continue;
                }
            };
            scope.set(params.keyword_start() + offset, value);
        }
        if !missing.is_empty() {
            let noun = if missing.len() == 1 { "keyword" } else { "keywords" };
            return Err(RunError::argument(format!("missing {noun}: {}", missing.join(", "))));
        }
        if !hash.is_empty() {
            let mut unknown = Vec::new();
            for (key, _) in hash.pairs() {
                unknown.push(self.inspect_value(key)?);
            }
            let noun = if unknown.len() == 1 { "keyword" } else { "keywords" };
            return Err(RunError::argument(format!("unknown {noun}: {}", unknown.join(", "))));
        }
        Ok(())
    }

    /// Arguments of an implicit-argument `super`: the current values of the method's
    /// parameters, with keyword parameters packed into a trailing Hash.
    ///
    /// Returns the arguments and whether they end in keywords.
    pub(crate) fn zsuper_args(&mut self, method: &MethodContext) -> RunResult<(Vec<Value>, bool)> {
        let Some(iseq) = &method.iseq else {
            return Err(ExcType::RuntimeError.error(
                "implicit argument passing of super from method defined by define_method() is not supported. \
                 Specify all arguments explicitly.",
            ));
        };
        let params = &iseq.params;
        let scope = &method.scope;
        let mut args: Vec<Value> = (0..params.rest_index()).map(|slot| scope.get(slot)).collect();
        if params.rest {
            let rest = scope.get(params.rest_index());
            match self.array_of(rest) {
                Some(items) => args.extend_from_slice(items),
                None => args.push(rest),
            }
        }
        args.extend((params.post_start()..params.keyword_start()).map(|slot| scope.get(slot)));
        if params.keywords.is_empty() {
            return Ok((args, false));
        }
        let mut hash = RHash::new();
        for (offset, keyword) in params.keywords.iter().enumerate() {
            let key = Value::Symbol(keyword.name);
            let hash_key = self.hash_key(key, false);
            hash.insert(hash_key, key, scope.get(params.keyword_start() + offset));
        }
        args.push(self.new_hash(hash)?);
        Ok((args, true))
    }
}
