mod node;
mod op;
mod scalar;
mod tree;
