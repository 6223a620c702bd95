//! Variable store paths with parameter groups.
//!
//! Encoders create all of their parameters through [`PathExt`], so that
//! an optimizer can give e.g. embeddings and recurrent weights their own
//! hyper-parameters.

use std::ops::Div;
use std::rc::Rc;

use itertools::Itertools;
use tch::nn::{Init, Path, VarStore};
use tch::{TchError, Tensor};

/// Trait that provides the root of a variable store.
pub trait RootExt {
    /// Get the root of a variable store.
    ///
    /// In contrast to the regular `root` method, `root_ext` allows
    /// you to provide a function that maps a variable name to a
    /// parameter group.
    fn root_ext<F>(&self, parameter_group_fun: F) -> PathExt
    where
        F: 'static + Fn(&str) -> usize;
}

impl RootExt for VarStore {
    fn root_ext<F>(&self, parameter_group_fun: F) -> PathExt
    where
        F: 'static + Fn(&str) -> usize,
    {
        PathExt {
            inner: self.root(),
            parameter_group_fun: Rc::new(parameter_group_fun),
        }
    }
}

/// Variable store path that assigns parameters to groups.
pub struct PathExt<'a> {
    inner: Path<'a>,
    parameter_group_fun: Rc<dyn Fn(&str) -> usize>,
}

impl<'a> PathExt<'a> {
    /// Full name of a variable `name` in this path.
    pub fn full_name(&self, name: &str) -> String {
        let components = self.inner.components().join(".");
        if components.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", components, name)
        }
    }

    /// Create a tensor variable initialized with ones.
    pub fn ones(&self, name: &str, dims: &[i64]) -> Result<Tensor, TchError> {
        self.grouped_path(name).f_ones(name, dims)
    }

    /// Get a sub-path of the current path.
    pub fn sub<T: ToString>(&'a self, s: T) -> PathExt<'a> {
        PathExt {
            inner: self.inner.sub(s),
            parameter_group_fun: self.parameter_group_fun.clone(),
        }
    }

    /// Create a tensor variable initialized with the given initializer.
    pub fn var(&self, name: &str, dims: &[i64], init: Init) -> Result<Tensor, TchError> {
        self.grouped_path(name).f_var(name, dims, init)
    }

    /// Create a tensor variable initialized with zeros.
    pub fn zeros(&self, name: &str, dims: &[i64]) -> Result<Tensor, TchError> {
        self.grouped_path(name).f_zeros(name, dims)
    }

    fn grouped_path(&self, name: &str) -> Path<'a> {
        let group = (self.parameter_group_fun)(&self.full_name(name));
        self.inner.set_group(group)
    }
}

impl<'a, T> Div<T> for &'a mut PathExt<'a>
where
    T: std::string::ToString,
{
    type Output = PathExt<'a>;

    fn div(self, rhs: T) -> Self::Output {
        self.sub(rhs.to_string())
    }
}

impl<'a, T> Div<T> for &'a PathExt<'a>
where
    T: std::string::ToString,
{
    type Output = PathExt<'a>;

    fn div(self, rhs: T) -> Self::Output {
        self.sub(rhs.to_string())
    }
}
