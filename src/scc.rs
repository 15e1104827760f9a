//! Strongly connected components (Tarjan), iterative to survive deep graphs.

use std::collections::HashMap;

/// Returns the SCCs of the graph restricted to `nodes`, in reverse topological order.
///
/// Edges leading outside of `nodes` are ignored.
pub fn tarjan<I>(nodes: &[usize], succs: impl Fn(usize) -> I) -> Vec<Vec<usize>>
where
    I: IntoIterator<Item = usize>,
{
    let member: HashMap<usize, usize> = nodes.iter().enumerate().map(|(i, &n)| (n, i)).collect();

    let n = nodes.len();
    let mut index = vec![usize::MAX; n];
    let mut lowlink = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut next_index = 0;
    let mut sccs = Vec::new();

    for root in 0..n {
        if index[root] != usize::MAX {
            continue;
        }

        // DFS frames: (vertex, its remaining successors)
        let mut frames: Vec<(usize, Vec<usize>)> = Vec::new();
        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        frames.push((root, local_succs(&member, &succs, nodes[root])));

        while let Some((v, pending)) = frames.last_mut() {
            let v = *v;
            if let Some(w) = pending.pop() {
                if index[w] == usize::MAX {
                    index[w] = next_index;
                    lowlink[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    frames.push((w, local_succs(&member, &succs, nodes[w])));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
                continue;
            }

            frames.pop();
            if let Some((parent, _)) = frames.last() {
                lowlink[*parent] = lowlink[*parent].min(lowlink[v]);
            }

            if lowlink[v] == index[v] {
                let mut scc = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    scc.push(nodes[w]);
                    if w == v {
                        break;
                    }
                }
                scc.sort_unstable();
                sccs.push(scc);
            }
        }
    }

    sccs
}

fn local_succs<I>(member: &HashMap<usize, usize>, succs: &impl Fn(usize) -> I, node: usize) -> Vec<usize>
where
    I: IntoIterator<Item = usize>,
{
    succs(node).into_iter().filter_map(|s| member.get(&s).copied()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(nodes: &[usize], edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
        let mut sccs = tarjan(nodes, |v| {
            edges.iter().filter(move |&&(a, _)| a == v).map(|&(_, b)| b).collect::<Vec<_>>()
        });
        sccs.sort();
        sccs
    }

    #[test]
    fn test_dag() {
        let sccs = run(&[0, 1, 2], &[(0, 1), (1, 2)]);
        assert_eq!(sccs, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_cycles() {
        let edges = [(0, 1), (1, 2), (2, 1), (2, 3), (3, 4), (4, 3), (4, 5)];
        let sccs = run(&[0, 1, 2, 3, 4, 5], &edges);
        assert_eq!(sccs, vec![vec![0], vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn test_ignores_outside_nodes() {
        // 1 -> 7 -> 2 -> 1 is not a cycle once 7 is excluded
        let edges = [(1, 7), (7, 2), (2, 1)];
        let sccs = run(&[1, 2], &edges);
        assert_eq!(sccs, vec![vec![1], vec![2]]);
    }

    #[test]
    fn test_long_chain_cycle() {
        let n = 10_000;
        let nodes: Vec<usize> = (0..n).collect();
        let sccs = tarjan(&nodes, |v| vec![(v + 1) % n]);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].len(), n);
    }
}
