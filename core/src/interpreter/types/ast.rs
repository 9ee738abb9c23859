//! Evaluation tree node types
//!
//! Trees arrive already resolved from the parser, usually as `"t"`-tagged
//! JSON. Every node gets a process-unique `NodeId` when it is constructed or
//! deserialized; the id is what suspend records are keyed by, so nodes are
//! never cloned (share them through `Arc` instead).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of one node in an evaluation tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate an id no other node in this process carries
    pub fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// One node of an evaluation tree
#[derive(Debug, Serialize, Deserialize)]
pub struct Node {
    #[serde(skip, default = "NodeId::fresh")]
    pub id: NodeId,

    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Node variants
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum NodeKind {
    Int {
        v: i64,
    },
    Float {
        v: f64,
    },
    Str {
        v: String,
    },
    Bool {
        v: bool,
    },
    Null,
    Void,
    /// Variable reference; evaluates to the slot, not its value
    Var {
        name: String,
    },
    /// `data name = init` declared in the current scope
    Data {
        name: String,
        #[serde(default)]
        init: Option<Box<Node>>,
    },
    Assign {
        target: Box<Node>,
        value: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Block {
        body: Vec<Node>,
    },
    If {
        test: Box<Node>,
        then_s: Box<Node>,
        #[serde(default)]
        else_s: Option<Box<Node>>,
    },
    /// Unbounded when `count` is absent
    Repeat {
        #[serde(default)]
        count: Option<Box<Node>>,
        body: Box<Node>,
        #[serde(default)]
        label: Option<String>,
    },
    Stop,
    Return {
        #[serde(default)]
        value: Option<Box<Node>>,
    },
    Yield,
    Call {
        callee: Box<Node>,
        #[serde(default)]
        args: Vec<Node>,
    },
    Method {
        receiver: Box<Node>,
        name: String,
        #[serde(default)]
        args: Vec<Node>,
    },
    Field {
        receiver: Box<Node>,
        name: String,
    },
    New {
        class: Box<Node>,
        #[serde(default)]
        args: Vec<Node>,
    },
    Lambda {
        #[serde(default)]
        params: Vec<String>,
        body: Arc<Node>,
    },
    Async {
        thread: Box<Node>,
        body: Arc<Node>,
    },
    /// Native capability looked up by dotted name
    Import {
        path: String,
    },
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Node {
            id: NodeId::fresh(),
            kind,
        }
    }

    pub fn int(v: i64) -> Self {
        Node::new(NodeKind::Int { v })
    }

    pub fn float(v: f64) -> Self {
        Node::new(NodeKind::Float { v })
    }

    pub fn str(v: impl Into<String>) -> Self {
        Node::new(NodeKind::Str { v: v.into() })
    }

    pub fn bool(v: bool) -> Self {
        Node::new(NodeKind::Bool { v })
    }

    pub fn null() -> Self {
        Node::new(NodeKind::Null)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Node::new(NodeKind::Var { name: name.into() })
    }

    pub fn data(name: impl Into<String>, init: Node) -> Self {
        Node::new(NodeKind::Data {
            name: name.into(),
            init: Some(Box::new(init)),
        })
    }

    pub fn assign(target: Node, value: Node) -> Self {
        Node::new(NodeKind::Assign {
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    pub fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Self {
        Node::new(NodeKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn unary(op: UnaryOp, operand: Node) -> Self {
        Node::new(NodeKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn block(body: Vec<Node>) -> Self {
        Node::new(NodeKind::Block { body })
    }

    pub fn if_else(test: Node, then_s: Node, else_s: Option<Node>) -> Self {
        Node::new(NodeKind::If {
            test: Box::new(test),
            then_s: Box::new(then_s),
            else_s: else_s.map(Box::new),
        })
    }

    pub fn repeat(count: Option<Node>, body: Node) -> Self {
        Node::new(NodeKind::Repeat {
            count: count.map(Box::new),
            body: Box::new(body),
            label: None,
        })
    }

    pub fn stop() -> Self {
        Node::new(NodeKind::Stop)
    }

    pub fn ret(value: Option<Node>) -> Self {
        Node::new(NodeKind::Return {
            value: value.map(Box::new),
        })
    }

    pub fn yield_now() -> Self {
        Node::new(NodeKind::Yield)
    }

    pub fn call(callee: Node, args: Vec<Node>) -> Self {
        Node::new(NodeKind::Call {
            callee: Box::new(callee),
            args,
        })
    }

    pub fn method(receiver: Node, name: impl Into<String>, args: Vec<Node>) -> Self {
        Node::new(NodeKind::Method {
            receiver: Box::new(receiver),
            name: name.into(),
            args,
        })
    }

    pub fn field(receiver: Node, name: impl Into<String>) -> Self {
        Node::new(NodeKind::Field {
            receiver: Box::new(receiver),
            name: name.into(),
        })
    }

    pub fn new_instance(class: Node, args: Vec<Node>) -> Self {
        Node::new(NodeKind::New {
            class: Box::new(class),
            args,
        })
    }

    pub fn lambda(params: Vec<String>, body: Node) -> Self {
        Node::new(NodeKind::Lambda {
            params,
            body: Arc::new(body),
        })
    }

    pub fn async_block(thread: Node, body: Node) -> Self {
        Node::new(NodeKind::Async {
            thread: Box::new(thread),
            body: Arc::new(body),
        })
    }

    pub fn import(path: impl Into<String>) -> Self {
        Node::new(NodeKind::Import { path: path.into() })
    }
}

/// A named function with positional parameters
///
/// Functions sharing a name form an overload group resolved by arity.
#[derive(Debug, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    pub body: Arc<Node>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, params: &[&str], body: Node) -> Self {
        FunctionDecl {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body: Arc::new(body),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}
