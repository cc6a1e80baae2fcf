use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{alpha1, alphanumeric1, char, multispace1},
    combinator::{cut, opt, recognize, value},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

#[derive(Debug, PartialEq, Eq)]
pub enum NodeDef<'src> {
    Sequence(Vec<NodeDef<'src>>),
    Selector(Vec<NodeDef<'src>>),
    /// `if (Condition) { ... }`; several children are wrapped in a Sequence when loaded.
    If {
        condition: &'src str,
        negated: bool,
        children: Vec<NodeDef<'src>>,
    },
    /// A registered leaf or a reference to another tree in the same source.
    Leaf(&'src str),
}

#[derive(Debug, PartialEq, Eq)]
pub struct TreeDef<'src> {
    pub name: &'src str,
    pub root: NodeDef<'src>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TreeSource<'src> {
    pub tree_defs: Vec<TreeDef<'src>>,
}

impl<'src> TreeSource<'src> {
    pub fn find(&self, name: &str) -> Option<&TreeDef<'src>> {
        self.tree_defs.iter().find(|tree| tree.name == name)
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn line_comment(i: &str) -> IResult<&str, ()> {
    value((), pair(char('#'), opt(is_not("\n\r"))))(i)
}

/// Whitespace, newlines and line comments.
fn ws(i: &str) -> IResult<&str, ()> {
    value((), many0(alt((value((), multispace1), line_comment))))(i)
}

fn open_paren(i: &str) -> IResult<&str, ()> {
    value((), delimited(ws, char('('), ws))(i)
}

fn close_paren(i: &str) -> IResult<&str, ()> {
    value((), delimited(ws, char(')'), ws))(i)
}

fn open_brace(i: &str) -> IResult<&str, ()> {
    value((), delimited(ws, char('{'), ws))(i)
}

fn close_brace(i: &str) -> IResult<&str, ()> {
    value((), delimited(ws, char('}'), ws))(i)
}

fn children(i: &str) -> IResult<&str, Vec<NodeDef>> {
    let (i, _) = open_brace(i)?;
    let (i, children) = many0(delimited(ws, parse_node, ws))(i)?;
    // Past the opening brace, anything but a node or the closing brace is an error.
    let (i, _) = cut(close_brace)(i)?;
    Ok((i, children))
}

fn composite(i: &str) -> IResult<&str, NodeDef> {
    let (rest, keyword) = identifier(i)?;
    let sequence = match keyword {
        "Sequence" | "Sequencer" => true,
        "Selector" | "Fallback" => false,
        _ => return Err(nom::Err::Error(Error::new(i, ErrorKind::Tag))),
    };
    let (rest, children) = children(rest)?;
    Ok((
        rest,
        if sequence {
            NodeDef::Sequence(children)
        } else {
            NodeDef::Selector(children)
        },
    ))
}

fn if_node(i: &str) -> IResult<&str, NodeDef> {
    let (i, _) = terminated(tag("if"), open_paren)(i)?;

    let (i, negated) = opt(terminated(char('!'), ws))(i)?;

    let (i, condition) = cut(terminated(identifier, close_paren))(i)?;

    let (i, children) = cut(children)(i)?;

    Ok((
        i,
        NodeDef::If {
            condition,
            negated: negated.is_some(),
            children,
        },
    ))
}

fn leaf(i: &str) -> IResult<&str, NodeDef> {
    let (i, name) = identifier(i)?;
    Ok((i, NodeDef::Leaf(name)))
}

pub fn parse_node(i: &str) -> IResult<&str, NodeDef> {
    alt((if_node, composite, leaf))(i)
}

pub fn tree_def(i: &str) -> IResult<&str, TreeDef> {
    let (i, _) = terminated(tag("tree"), multispace1)(i)?;

    let (i, name) = identifier(i)?;

    let (i, _) = delimited(ws, char('='), ws)(i)?;

    let (i, root) = cut(parse_node)(i)?;

    Ok((i, TreeDef { name, root }))
}

pub fn parse_file(i: &str) -> IResult<&str, TreeSource> {
    let (i, tree_defs) = preceded(ws, many0(terminated(tree_def, ws)))(i)?;

    Ok((i, TreeSource { tree_defs }))
}
