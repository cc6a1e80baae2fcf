use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};

use crate::leaf::{AsyncFn, Condition, InstantFn, Leaf, PredicateFn};
use crate::{LeafResult, Outcome};

fn succeed<C>(_ctx: &mut C) -> LeafResult {
    Ok(Outcome::Succeeded)
}

fn fail<C>(_ctx: &mut C) -> LeafResult {
    Ok(Outcome::Failed)
}

fn always<C>(_ctx: &C) -> bool {
    true
}

fn never<C>(_ctx: &C) -> bool {
    false
}

/// Named leaves and conditions that tree definitions can refer to.
pub struct Registry<C> {
    leaves: HashMap<String, Leaf<C>>,
    conditions: HashMap<String, Condition<C>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        let mut ret = Self::empty();
        ret.register_instant("Succeed", succeed::<C>);
        ret.register_instant("Fail", fail::<C>);
        ret.register_condition("Always", always::<C>);
        ret.register_condition("Never", never::<C>);
        ret
    }
}

impl<C> Registry<C> {
    /// A registry without the built-in leaves and conditions.
    pub fn empty() -> Self {
        Self {
            leaves: HashMap::new(),
            conditions: HashMap::new(),
        }
    }

    pub fn register_instant(&mut self, name: impl ToString, body: InstantFn<C>) {
        let name = name.to_string();
        self.leaves.insert(name.clone(), Leaf::instant(name, body));
    }

    pub fn register_action(&mut self, name: impl ToString, body: AsyncFn<C>) {
        let name = name.to_string();
        self.leaves.insert(name.clone(), Leaf::action(name, body));
    }

    pub fn register_condition(&mut self, name: impl ToString, test: PredicateFn<C>) {
        let name = name.to_string();
        self.conditions
            .insert(name.clone(), Condition::new(name, test));
    }

    pub fn leaf(&self, name: &str) -> Option<Leaf<C>> {
        self.leaves.get(name).cloned()
    }

    pub fn condition(&self, name: &str) -> Option<Condition<C>> {
        self.conditions.get(name).cloned()
    }
}

impl<C> Debug for Registry<C> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut leaves: Vec<_> = self.leaves.keys().collect();
        leaves.sort();
        let mut conditions: Vec<_> = self.conditions.keys().collect();
        conditions.sort();
        f.debug_struct("Registry")
            .field("leaves", &leaves)
            .field("conditions", &conditions)
            .finish()
    }
}
