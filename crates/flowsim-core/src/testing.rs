use crate::network::{Link, Node, NodeId};

/// Two nodes joined by one single-slot link. Only node 0 originates flows, and at rate 0 it never
/// does on its own.
pub(crate) fn two_node_config() -> (Vec<Node>, Vec<Link>) {
    let n0 = Node::new(NodeId::new(0), 0.0, 1.0).unwrap();
    let n1 = Node::new(NodeId::new(1), 0.0, 1.0).unwrap();
    let l = Link::new(n0.id, n1.id, 1, 1.0);
    (vec![n0, n1], vec![l])
}

/// Four nodes in a diamond with a chord between 1 and 2. Every link has one slot.
///
/// ```text
///      1
///   3 / | \ 10
///    0  |2  3
///   9 \ | / 1
///      2
/// ```
pub(crate) fn diamond_config() -> (Vec<Node>, Vec<Link>) {
    let nodes = (0..4)
        .map(|i| Node::new(NodeId::new(i), 1.0, 1.0).unwrap())
        .collect::<Vec<_>>();
    let links = [(0, 1, 3.0), (0, 2, 9.0), (1, 2, 2.0), (1, 3, 10.0), (2, 3, 1.0)]
        .into_iter()
        .map(|(a, b, w)| Link::new(NodeId::new(a), NodeId::new(b), 1, w))
        .collect();
    (nodes, links)
}

/// A fully connected triangle with two slots per link, all nodes originating flows.
pub(crate) fn triangle_config(arrival_rate: f64, service_rate: f64) -> (Vec<Node>, Vec<Link>) {
    let nodes = (0..3)
        .map(|i| Node::new(NodeId::new(i), arrival_rate, service_rate).unwrap())
        .collect::<Vec<_>>();
    let links = [(0, 1), (0, 2), (1, 2)]
        .into_iter()
        .map(|(a, b)| Link::new(NodeId::new(a), NodeId::new(b), 2, 1.0))
        .collect();
    (nodes, links)
}
